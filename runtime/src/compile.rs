//! BPF program compilation.
//!
//! Two interchangeable strategies produce the same contract: a BPF ELF
//! object written to the requested output path. The containerized strategy
//! runs the toolchain inside a build image; the local strategy feeds a
//! bundled build script to `sh` over stdin.

use std::path::Path;

use bpfkit_core::error::{BpfkitError, Result};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::exec::run_captured;

/// Build script fed to `sh` for local builds, bundled at compile time.
static LOCAL_BUILD_SCRIPT: &str = include_str!("scripts/build-bpf.sh");

/// Mount point of the working directory inside the containerized build environment.
const CONTAINER_BUILD_DIR: &str = "/usr/src/bpf";

/// How a BPF program gets compiled.
#[derive(Debug, Clone)]
pub enum CompileStrategy {
    /// Run the toolchain inside a container image.
    Containerized {
        /// Executable used to run the container (e.g. `docker`)
        builder: String,
        /// Image carrying the build toolchain
        build_image: String,
    },
    /// Run the bundled build script with the host toolchain.
    Local,
}

/// Compiles BPF C sources into ELF objects.
#[derive(Debug, Clone)]
pub struct Compiler {
    strategy: CompileStrategy,
}

impl Compiler {
    /// Create a compiler with the given strategy.
    pub fn new(strategy: CompileStrategy) -> Self {
        Self { strategy }
    }

    /// Compile `source` into a BPF ELF object at `output`.
    ///
    /// On non-zero exit of the external process the captured combined
    /// output is surfaced inside the error; nothing is retried.
    pub async fn compile(
        &self,
        cancel: &CancellationToken,
        source: &Path,
        output: &Path,
    ) -> Result<()> {
        match &self.strategy {
            CompileStrategy::Containerized {
                builder,
                build_image,
            } => {
                compile_containerized(cancel, builder, build_image, source, output).await
            }
            CompileStrategy::Local => compile_local(cancel, source, output).await,
        }
    }
}

async fn compile_containerized(
    cancel: &CancellationToken,
    builder: &str,
    build_image: &str,
    source: &Path,
    output: &Path,
) -> Result<()> {
    let cwd = std::env::current_dir()?;

    let mut cmd = Command::new(builder);
    cmd.arg("run")
        .arg("-v")
        .arg(format!("{}:{}", cwd.display(), CONTAINER_BUILD_DIR))
        .arg(build_image)
        .arg(source)
        .arg(output);

    tracing::debug!(
        builder,
        build_image,
        source = %source.display(),
        "compiling BPF program in container"
    );

    let out = run_captured(cancel, cmd, None)
        .await
        .map_err(|e| as_compile_error(builder, e))?;
    if !out.success() {
        return Err(BpfkitError::Compile {
            message: format!("{} exited with status {}", builder, out.exit_code),
            output: out.output_lossy(),
        });
    }
    Ok(())
}

async fn compile_local(
    cancel: &CancellationToken,
    source: &Path,
    output: &Path,
) -> Result<()> {
    // The script travels over stdin; only the paths are positional arguments.
    let mut cmd = Command::new("sh");
    cmd.arg("-s").arg("--").arg(source).arg(output);

    tracing::debug!(source = %source.display(), "compiling BPF program locally");

    let out = run_captured(cancel, cmd, Some(LOCAL_BUILD_SCRIPT))
        .await
        .map_err(|e| as_compile_error("sh", e))?;
    if !out.success() {
        return Err(BpfkitError::Compile {
            message: format!("local build exited with status {}", out.exit_code),
            output: out.output_lossy(),
        });
    }
    Ok(())
}

/// Keep cancellation distinct; fold everything else into the compile taxonomy.
fn as_compile_error(program: &str, err: BpfkitError) -> BpfkitError {
    match err {
        cancelled @ BpfkitError::Cancelled(_) => cancelled,
        other => BpfkitError::Compile {
            message: format!("failed to invoke {program}: {other}"),
            output: String::new(),
        },
    }
}
