//! bpfkit Runtime - the build pipeline.
//!
//! This crate implements the pipeline that turns a BPF C source file into a
//! distributable artifact: compilation (containerized or local), packaging
//! into a local OCI-layout store, filtered store-to-store distribution, and
//! optional synthesis of a combined runner image.

pub mod compile;
pub mod exec;
pub mod image;
pub mod oci;
pub mod pipeline;
pub mod platform;

// Re-export common types
pub use compile::{CompileStrategy, Compiler};
pub use exec::run_captured;
pub use image::{default_image_tag, SynthesisOptions, SCRATCH_STORE_DIR};
pub use oci::{allowed_media_types, BpfArtifact, OciStore};
pub use pipeline::{ImageOptions, PipelineOptions, PipelineOutcome, PipelineStage};
pub use platform::Platform;

/// bpfkit runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
