//! The build pipeline.
//!
//! One invocation drives `Compiling → Packaging → (optional: Distributing →
//! Synthesizing) → Done`. Every stage failure is terminal for the run; the
//! failing stage is reported alongside the error. The scratch store and
//! build context for the optional branch share a single temp directory
//! whose guard removes it on success, error, and panic alike.

use std::fmt;
use std::path::{Path, PathBuf};

use bpfkit_core::error::{BpfkitError, Result};
use tokio_util::sync::CancellationToken;

use crate::compile::{CompileStrategy, Compiler};
use crate::image::{self, SynthesisOptions, SCRATCH_STORE_DIR};
use crate::oci::{self, package, OciStore};
use crate::platform;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Compiling,
    Packaging,
    Distributing,
    Synthesizing,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Compiling => "compiling",
            PipelineStage::Packaging => "packaging",
            PipelineStage::Distributing => "distributing",
            PipelineStage::Synthesizing => "synthesizing",
            PipelineStage::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Options for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// BPF C source file
    pub source: PathBuf,
    /// Reference to tag the artifact with in the store
    pub reference: String,
    /// Output file for the BPF ELF; defaults to the source with a `.o` extension
    pub output_file: Option<PathBuf>,
    /// How to compile
    pub strategy: CompileStrategy,
    /// Root directory of the artifact store
    pub store_dir: PathBuf,
    /// When set, also assemble a combined runner image
    pub image: Option<ImageOptions>,
}

/// Options for the combined-image branch.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    /// Base runner image
    pub runner_image: String,
    /// Tag of the base runner image
    pub runner_tag: String,
    /// Destination tag; derived from the reference when absent
    pub dest_tag: Option<String>,
    /// Executable used for the image build
    pub builder: String,
}

/// What a successful run produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Reference the artifact was tagged with
    pub reference: String,
    /// Path of the compiled ELF
    pub output_file: PathBuf,
    /// Tag of the combined image, when one was built
    pub image_tag: Option<String>,
}

/// Run the pipeline to completion.
pub async fn run(cancel: &CancellationToken, options: PipelineOptions) -> Result<PipelineOutcome> {
    let mut stage = PipelineStage::Compiling;
    let result = execute(cancel, &options, &mut stage).await;
    if let Err(e) = &result {
        tracing::error!(stage = %stage, error = %e, "pipeline failed");
        if let Some(output) = e.process_output() {
            if !output.is_empty() {
                tracing::error!(stage = %stage, "process output:\n{output}");
            }
        }
    }
    result
}

async fn execute(
    cancel: &CancellationToken,
    options: &PipelineOptions,
    stage: &mut PipelineStage,
) -> Result<PipelineOutcome> {
    *stage = PipelineStage::Compiling;
    let output_file = options
        .output_file
        .clone()
        .unwrap_or_else(|| default_output_path(&options.source));
    // Create (or truncate) the output up front so a stale object from an
    // earlier run can never masquerade as this run's result.
    drop(std::fs::File::create(&output_file)?);

    let compiler = Compiler::new(options.strategy.clone());
    tracing::info!(
        source = %options.source.display(),
        output = %output_file.display(),
        "compiling BPF program"
    );
    compiler.compile(cancel, &options.source, &output_file).await?;

    // Re-read through a fresh handle for a coherent view of the flushed bytes.
    let program = std::fs::read(&output_file)?;
    let platform = platform::probe_platform(cancel).await;
    let artifact = package::BpfArtifact::new(program, platform)?;

    *stage = PipelineStage::Packaging;
    let store = OciStore::open_or_create(&options.store_dir).map_err(|e| {
        BpfkitError::Package(format!(
            "opening store at {}: {e}",
            options.store_dir.display()
        ))
    })?;
    package::push(cancel, &store, &options.reference, &artifact).await?;

    let mut image_tag = None;
    if let Some(image_options) = &options.image {
        *stage = PipelineStage::Distributing;
        let context = tempfile::Builder::new()
            .prefix("bpfkit-build-")
            .tempdir()?;
        let scratch = OciStore::open_or_create(context.path().join(SCRATCH_STORE_DIR))
            .map_err(|e| BpfkitError::Copy(format!("creating scratch store: {e}")))?;
        oci::copy(
            cancel,
            &store,
            &options.reference,
            &scratch,
            &package::allowed_media_types(),
        )
        .await?;

        *stage = PipelineStage::Synthesizing;
        let synthesis = SynthesisOptions {
            source_reference: options.reference.clone(),
            runner_image: image_options.runner_image.clone(),
            runner_tag: image_options.runner_tag.clone(),
            dest_tag: image_options.dest_tag.clone(),
            builder: image_options.builder.clone(),
        };
        image_tag = Some(image::synthesize(cancel, &synthesis, context.path()).await?);
    }

    *stage = PipelineStage::Done;
    Ok(PipelineOutcome {
        reference: options.reference.clone(),
        output_file,
        image_tag,
    })
}

/// Default output path: the source path with its extension replaced by `.o`.
fn default_output_path(source: &Path) -> PathBuf {
    source.with_extension("o")
}
