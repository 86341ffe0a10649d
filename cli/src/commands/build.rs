//! `bpfkit build` command: compile a BPF program and package it.
//!
//! Compiles the source (in a container by default, locally with `--local`),
//! pushes the result into the local artifact store, and with `--combined`
//! also assembles a runner image embedding the artifact.

use std::path::PathBuf;

use clap::Args;
use tokio_util::sync::CancellationToken;

use bpfkit_core::config::GeneralConfig;
use bpfkit_runtime::pipeline::{self, ImageOptions, PipelineOptions};
use bpfkit_runtime::CompileStrategy;

#[derive(Args)]
pub struct BuildArgs {
    /// BPF C source file to compile
    pub source: PathBuf,

    /// Reference to save the artifact under (e.g. "local/probe:v1")
    pub reference: String,

    /// Container image carrying the build toolchain
    #[arg(short = 'i', long)]
    pub build_image: Option<String>,

    /// Executable used for container build/run commands
    #[arg(short = 'b', long)]
    pub builder: Option<String>,

    /// Output file for the BPF ELF (defaults to the source with a .o extension)
    #[arg(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Compile with local tools instead of the containerized toolchain
    #[arg(short = 'l', long)]
    pub local: bool,

    /// Also build a combined image embedding the artifact and a runner base image
    #[arg(long)]
    pub combined: bool,

    /// Base runner image for the combined image
    #[arg(long)]
    pub runner_image: Option<String>,

    /// Tag of the base runner image
    #[arg(long)]
    pub runner_tag: Option<String>,

    /// Name and tag of the combined image (defaults to a tag derived from the reference)
    #[arg(long)]
    pub image_tag: Option<String>,

    /// Root directory of the local artifact store
    #[arg(long)]
    pub store_dir: Option<PathBuf>,
}

pub async fn execute(args: BuildArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = GeneralConfig::from_env();

    let builder = args.builder.unwrap_or(config.builder);
    let strategy = if args.local {
        CompileStrategy::Local
    } else {
        CompileStrategy::Containerized {
            builder: builder.clone(),
            build_image: args.build_image.unwrap_or(config.build_image),
        }
    };

    let image = args.combined.then(|| ImageOptions {
        runner_image: args.runner_image.unwrap_or(config.runner_image),
        runner_tag: args.runner_tag.unwrap_or(config.runner_tag),
        dest_tag: args.image_tag,
        builder,
    });

    let options = PipelineOptions {
        source: args.source,
        reference: args.reference,
        output_file: args.output_file,
        strategy,
        store_dir: args.store_dir.unwrap_or(config.store_dir),
        image,
    };

    // Ctrl-C cancels the in-flight run: the pipeline kills whatever external
    // process it is waiting on and unwinds through its scope guards.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("cancellation requested, terminating build");
            signal_token.cancel();
        }
    });

    let outcome = pipeline::run(&cancel, options).await?;

    println!(
        "Compiled {} and saved it to {}",
        outcome.output_file.display(),
        outcome.reference
    );
    if let Some(tag) = outcome.image_tag {
        println!("Combined image built and tagged as {tag}");
    }

    Ok(())
}
