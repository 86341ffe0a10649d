//! BPF artifact packaging.
//!
//! An artifact is stored as three blobs: a JSON config (created timestamp
//! plus the platform tuple), the raw program bytes, and an OCI image
//! manifest tying the two together. The manifest descriptor tagged in the
//! index carries the reference and the platform tuple as annotations.

use std::collections::HashMap;

use bpfkit_core::error::{BpfkitError, Result};
use chrono::{DateTime, Utc};
use oci_spec::image::{ImageManifest, ImageManifestBuilder, MediaType};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::store::{blob_descriptor, OciStore};
use crate::platform::Platform;

/// Media type of the artifact config blob.
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.bpfkit.config.v1+json";

/// Media type of the compiled BPF program blob.
pub const PROGRAM_MEDIA_TYPE: &str = "application/vnd.bpfkit.program.v1+binary";

const PLATFORM_OS_ANNOTATION: &str = "vnd.bpfkit.platform.os";
const PLATFORM_OS_VERSION_ANNOTATION: &str = "vnd.bpfkit.platform.os-version";
const PLATFORM_ARCH_ANNOTATION: &str = "vnd.bpfkit.platform.architecture";

/// The media types that make up a BPF artifact.
///
/// Store-to-store copies for image synthesis ferry exactly these; anything
/// else reachable from a reference is skipped.
pub fn allowed_media_types() -> Vec<String> {
    vec![
        MediaType::ImageManifest.to_string(),
        CONFIG_MEDIA_TYPE.to_string(),
        PROGRAM_MEDIA_TYPE.to_string(),
    ]
}

/// A compiled BPF program plus the platform it was built on.
///
/// Constructed once per build, immutable afterwards, pushed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct BpfArtifact {
    /// The compiled program, opaque to this subsystem.
    pub program: Vec<u8>,
    /// Build host platform; `None` when probing failed.
    pub platform: Option<Platform>,
}

impl BpfArtifact {
    /// Create an artifact, rejecting a zero-length program.
    pub fn new(program: Vec<u8>, platform: Option<Platform>) -> Result<Self> {
        if program.is_empty() {
            return Err(BpfkitError::Package(
                "refusing to package a zero-length program".to_string(),
            ));
        }
        Ok(Self { program, platform })
    }
}

/// The artifact config blob.
#[derive(Debug, Serialize, Deserialize)]
struct ArtifactConfig {
    created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<Platform>,
}

/// Push an artifact into the store under `reference`.
///
/// All-or-nothing from the caller's perspective: any serialization or
/// store-write failure aborts with a package error and nothing is tagged.
pub async fn push(
    cancel: &CancellationToken,
    store: &OciStore,
    reference: &str,
    artifact: &BpfArtifact,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(BpfkitError::Cancelled("push aborted".to_string()));
    }
    if artifact.program.is_empty() {
        return Err(BpfkitError::Package(
            "refusing to package a zero-length program".to_string(),
        ));
    }

    let config = ArtifactConfig {
        created: Utc::now(),
        platform: artifact.platform.clone(),
    };
    let config_bytes = serde_json::to_vec(&config)
        .map_err(|e| BpfkitError::Package(format!("serializing artifact config: {e}")))?;

    let (config_digest, config_size) = store
        .write_blob(&config_bytes)
        .map_err(|e| BpfkitError::Package(format!("writing config blob: {e}")))?;
    let (program_digest, program_size) = store
        .write_blob(&artifact.program)
        .map_err(|e| BpfkitError::Package(format!("writing program blob: {e}")))?;

    let config_descriptor = blob_descriptor(
        MediaType::Other(CONFIG_MEDIA_TYPE.to_string()),
        config_digest,
        config_size,
        None,
    )
    .map_err(|e| BpfkitError::Package(e.to_string()))?;
    let program_descriptor = blob_descriptor(
        MediaType::Other(PROGRAM_MEDIA_TYPE.to_string()),
        program_digest,
        program_size,
        None,
    )
    .map_err(|e| BpfkitError::Package(e.to_string()))?;

    let manifest = ImageManifestBuilder::default()
        .schema_version(2u32)
        .media_type(MediaType::ImageManifest)
        .config(config_descriptor)
        .layers(vec![program_descriptor])
        .build()
        .map_err(|e| BpfkitError::Package(format!("building manifest: {e}")))?;
    let manifest_bytes = serde_json::to_vec(&manifest)
        .map_err(|e| BpfkitError::Package(format!("serializing manifest: {e}")))?;
    let (manifest_digest, manifest_size) = store
        .write_blob(&manifest_bytes)
        .map_err(|e| BpfkitError::Package(format!("writing manifest blob: {e}")))?;

    let annotations = artifact.platform.as_ref().map(platform_annotations);
    let manifest_descriptor = blob_descriptor(
        MediaType::ImageManifest,
        manifest_digest,
        manifest_size,
        annotations,
    )
    .map_err(|e| BpfkitError::Package(e.to_string()))?;

    store
        .tag(reference, manifest_descriptor)
        .map_err(|e| BpfkitError::Package(format!("tagging {reference}: {e}")))?;

    tracing::info!(
        reference,
        size = artifact.program.len(),
        "pushed BPF artifact"
    );
    Ok(())
}

/// Pull an artifact back out of the store.
pub async fn pull(
    cancel: &CancellationToken,
    store: &OciStore,
    reference: &str,
) -> Result<BpfArtifact> {
    if cancel.is_cancelled() {
        return Err(BpfkitError::Cancelled("pull aborted".to_string()));
    }

    let root = store
        .resolve(reference)
        .map_err(|e| BpfkitError::Package(format!("resolving {reference}: {e}")))?;
    let manifest_bytes = store
        .read_blob(root.digest())
        .map_err(|e| BpfkitError::Package(format!("reading manifest: {e}")))?;
    let manifest: ImageManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| BpfkitError::Package(format!("parsing manifest: {e}")))?;

    let config_bytes = store
        .read_blob(manifest.config().digest())
        .map_err(|e| BpfkitError::Package(format!("reading config: {e}")))?;
    let config: ArtifactConfig = serde_json::from_slice(&config_bytes)
        .map_err(|e| BpfkitError::Package(format!("parsing config: {e}")))?;

    let program_descriptor = manifest
        .layers()
        .iter()
        .find(|l| l.media_type().to_string() == PROGRAM_MEDIA_TYPE)
        .ok_or_else(|| {
            BpfkitError::Package(format!("{reference} has no program layer"))
        })?;
    let program = store
        .read_blob(program_descriptor.digest())
        .map_err(|e| BpfkitError::Package(format!("reading program: {e}")))?;

    BpfArtifact::new(program, config.platform)
}

fn platform_annotations(platform: &Platform) -> HashMap<String, String> {
    let mut annotations = HashMap::new();
    annotations.insert(PLATFORM_OS_ANNOTATION.to_string(), platform.os.clone());
    annotations.insert(
        PLATFORM_OS_VERSION_ANNOTATION.to_string(),
        platform.os_version.clone(),
    );
    annotations.insert(
        PLATFORM_ARCH_ANNOTATION.to_string(),
        platform.architecture.clone(),
    );
    annotations
}
