//! bpfkit Core - Foundational Types and Abstractions
//!
//! This module provides the foundational types shared across the bpfkit
//! workspace: the error taxonomy, general configuration, and the captured
//! output of external processes.

pub mod config;
pub mod error;
pub mod exec;

// Re-export commonly used types
pub use config::GeneralConfig;
pub use error::{BpfkitError, Result};
pub use exec::ExecOutput;

/// bpfkit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
