//! bpfkit CLI - build, package, and distribute BPF programs as OCI artifacts.

pub mod commands;
