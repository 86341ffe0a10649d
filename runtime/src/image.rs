//! Runner-image synthesis.
//!
//! Wraps a distributed BPF artifact and a base runner image into a single
//! deployable image: the build context holds the bundled recipe plus the
//! scratch store populated by the copy stage, and an external builder does
//! the assembly. The recipe itself is static; only build arguments vary.

use std::path::Path;

use bpfkit_core::error::{BpfkitError, Result};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::exec::run_captured;

/// Build recipe bundled at compile time and written into the context as-is.
static RUNNER_DOCKERFILE: &str = include_str!("templates/Dockerfile.runner");

/// Subdirectory of the build context holding the scratch store.
///
/// The recipe's `COPY` instruction and the pipeline's scratch-store root
/// both point here.
pub const SCRATCH_STORE_DIR: &str = "store";

/// Prefix of derived combined-image tags.
const RUNNER_TAG_PREFIX: &str = "runner";

/// Options for one synthesis invocation.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Reference of the BPF artifact inside the scratch store
    pub source_reference: String,
    /// Base runner image
    pub runner_image: String,
    /// Tag of the base runner image
    pub runner_tag: String,
    /// Destination tag; derived from the source reference when absent
    pub dest_tag: Option<String>,
    /// Executable used for the image build
    pub builder: String,
}

/// Derive the default combined-image tag for a source reference.
///
/// The derivation is deterministic so repeated runs against the same
/// reference name the same image. Characters a tag cannot carry (notably
/// the `:` of the source reference) are mapped to `-`.
pub fn default_image_tag(source_reference: &str) -> String {
    format!(
        "{RUNNER_TAG_PREFIX}-{}:latest",
        sanitize_reference(source_reference)
    )
}

fn sanitize_reference(reference: &str) -> String {
    reference
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Build the combined image, returning the tag it was given.
///
/// `context_dir` must already contain the scratch store under
/// [`SCRATCH_STORE_DIR`]; this writes the recipe next to it and invokes
/// the builder.
pub async fn synthesize(
    cancel: &CancellationToken,
    options: &SynthesisOptions,
    context_dir: &Path,
) -> Result<String> {
    let recipe_path = context_dir.join("Dockerfile");
    std::fs::write(&recipe_path, RUNNER_DOCKERFILE).map_err(|e| BpfkitError::Synthesis {
        message: format!("writing build recipe to {}: {e}", recipe_path.display()),
        output: String::new(),
    })?;

    let tag = options
        .dest_tag
        .clone()
        .unwrap_or_else(|| default_image_tag(&options.source_reference));

    let mut cmd = Command::new(&options.builder);
    cmd.arg("build")
        .arg("--build-arg")
        .arg(format!("BPF_IMAGE={}", options.source_reference))
        .arg("--build-arg")
        .arg(format!("BEE_IMAGE={}", options.runner_image))
        .arg("--build-arg")
        .arg(format!("BEE_TAG={}", options.runner_tag))
        .arg(context_dir)
        .arg("-t")
        .arg(&tag);

    tracing::debug!(
        builder = %options.builder,
        context = %context_dir.display(),
        tag = %tag,
        "building combined runner image"
    );

    let out = run_captured(cancel, cmd, None).await.map_err(|e| match e {
        cancelled @ BpfkitError::Cancelled(_) => cancelled,
        other => BpfkitError::Synthesis {
            message: format!("failed to invoke {}: {other}", options.builder),
            output: String::new(),
        },
    })?;
    if !out.success() {
        return Err(BpfkitError::Synthesis {
            message: format!("{} build exited with status {}", options.builder, out.exit_code),
            output: out.output_lossy(),
        });
    }

    tracing::info!(tag = %tag, "combined runner image built");
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_default_image_tag_is_deterministic() {
        let first = default_image_tag("local/foo:v1");
        let second = default_image_tag("local/foo:v1");
        assert_eq!(first, second);
    }

    #[test]
    fn test_default_image_tag_sanitizes_colon() {
        assert_eq!(
            default_image_tag("local/foo:v1"),
            "runner-local/foo-v1:latest"
        );
    }

    #[test]
    fn test_default_image_tag_lowercases() {
        assert_eq!(
            default_image_tag("Local/Foo"),
            "runner-local/foo:latest"
        );
    }

    #[test]
    fn test_sanitize_keeps_valid_characters() {
        assert_eq!(
            sanitize_reference("ghcr.io/org/probe_v2-x"),
            "ghcr.io/org/probe_v2-x"
        );
    }

    #[test]
    fn test_sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_reference("a:b@c d"), "a-b-c-d");
    }

    #[test]
    fn test_recipe_is_bundled() {
        assert!(RUNNER_DOCKERFILE.contains("ARG BPF_IMAGE"));
        assert!(RUNNER_DOCKERFILE.contains("ARG BEE_IMAGE"));
        assert!(RUNNER_DOCKERFILE.contains("ARG BEE_TAG"));
        assert!(RUNNER_DOCKERFILE.contains(SCRATCH_STORE_DIR));
    }

    /// Write a stub builder that records its arguments to `log`.
    fn write_stub_builder(dir: &Path, log: &Path) -> std::path::PathBuf {
        let path = dir.join("stub-builder");
        std::fs::write(
            &path,
            format!("#!/bin/sh\necho \"$@\" >> {}\nexit 0\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_synthesize_invokes_builder_with_build_args() {
        let tmp = TempDir::new().unwrap();
        let context = tmp.path().join("context");
        std::fs::create_dir_all(context.join(SCRATCH_STORE_DIR)).unwrap();
        let log = tmp.path().join("builder.log");
        let builder = write_stub_builder(tmp.path(), &log);
        let cancel = CancellationToken::new();

        let options = SynthesisOptions {
            source_reference: "local/foo:v1".to_string(),
            runner_image: "runner/base".to_string(),
            runner_tag: "v2".to_string(),
            dest_tag: None,
            builder: builder.display().to_string(),
        };

        let tag = synthesize(&cancel, &options, &context).await.unwrap();
        assert_eq!(tag, "runner-local/foo-v1:latest");
        assert!(context.join("Dockerfile").exists());

        let logged = std::fs::read_to_string(&log).unwrap();
        assert!(logged.contains("--build-arg BPF_IMAGE=local/foo:v1"));
        assert!(logged.contains("--build-arg BEE_IMAGE=runner/base"));
        assert!(logged.contains("--build-arg BEE_TAG=v2"));
        assert!(logged.contains("-t runner-local/foo-v1:latest"));
        assert!(logged.contains(&context.display().to_string()));
    }

    #[tokio::test]
    async fn test_synthesize_honors_explicit_tag() {
        let tmp = TempDir::new().unwrap();
        let context = tmp.path().join("context");
        std::fs::create_dir_all(context.join(SCRATCH_STORE_DIR)).unwrap();
        let log = tmp.path().join("builder.log");
        let builder = write_stub_builder(tmp.path(), &log);
        let cancel = CancellationToken::new();

        let options = SynthesisOptions {
            source_reference: "local/foo:v1".to_string(),
            runner_image: "runner/base".to_string(),
            runner_tag: "v2".to_string(),
            dest_tag: Some("custom/image:tag".to_string()),
            builder: builder.display().to_string(),
        };

        let tag = synthesize(&cancel, &options, &context).await.unwrap();
        assert_eq!(tag, "custom/image:tag");
    }

    #[tokio::test]
    async fn test_synthesize_failure_carries_output() {
        let tmp = TempDir::new().unwrap();
        let context = tmp.path().join("context");
        std::fs::create_dir_all(&context).unwrap();
        let builder = tmp.path().join("failing-builder");
        std::fs::write(&builder, "#!/bin/sh\necho no builder available >&2\nexit 125\n")
            .unwrap();
        std::fs::set_permissions(&builder, std::fs::Permissions::from_mode(0o755)).unwrap();
        let cancel = CancellationToken::new();

        let options = SynthesisOptions {
            source_reference: "local/foo:v1".to_string(),
            runner_image: "runner/base".to_string(),
            runner_tag: "v2".to_string(),
            dest_tag: None,
            builder: builder.display().to_string(),
        };

        let err = synthesize(&cancel, &options, &context).await.unwrap_err();
        match err {
            BpfkitError::Synthesis { message, output } => {
                assert!(message.contains("125"));
                assert!(output.contains("no builder available"));
            }
            other => panic!("expected synthesis error, got {other}"),
        }
    }
}
