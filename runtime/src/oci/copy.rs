//! Filtered store-to-store artifact copy.
//!
//! Traverses the descriptor graph breadth-first, one level at a time: the
//! whole current frontier is fetched and written before any child level is
//! examined, so an interrupted copy leaves complete levels behind rather
//! than a partial depth-first branch. Entries whose media type is outside
//! the allow-list are skipped entirely: never fetched, never written.

use bpfkit_core::error::{BpfkitError, Result};
use oci_spec::image::{Descriptor, ImageManifest, MediaType};
use tokio_util::sync::CancellationToken;

use super::store::OciStore;

/// Copy the artifact tagged `reference` from `source` into `dest`,
/// restricted to `allowed_media_types`.
///
/// No partial cleanup of `dest` happens on failure; destroying an
/// ephemeral destination is the caller's responsibility.
pub async fn copy(
    cancel: &CancellationToken,
    source: &OciStore,
    reference: &str,
    dest: &OciStore,
    allowed_media_types: &[String],
) -> Result<()> {
    let root = source
        .resolve(reference)
        .map_err(|e| BpfkitError::Copy(format!("resolving {reference}: {e}")))?;
    if !is_allowed(root.media_type(), allowed_media_types) {
        return Err(BpfkitError::Copy(format!(
            "root descriptor for {reference} has media type {} outside the allow-list",
            root.media_type()
        )));
    }

    let mut frontier = vec![root.clone()];
    while !frontier.is_empty() {
        let mut next_level = Vec::new();
        for descriptor in &frontier {
            if cancel.is_cancelled() {
                return Err(BpfkitError::Cancelled("copy aborted".to_string()));
            }

            let bytes = source.read_blob(descriptor.digest()).map_err(|e| {
                BpfkitError::Copy(format!("fetching {}: {e}", descriptor.digest()))
            })?;
            let (written_digest, _) = dest.write_blob(&bytes).map_err(|e| {
                BpfkitError::Copy(format!("writing {}: {e}", descriptor.digest()))
            })?;
            if &written_digest != descriptor.digest() {
                return Err(BpfkitError::Copy(format!(
                    "digest mismatch for {}: content hashed to {written_digest}",
                    descriptor.digest()
                )));
            }

            if descriptor.media_type() == &MediaType::ImageManifest {
                let manifest: ImageManifest =
                    serde_json::from_slice(&bytes).map_err(|e| {
                        BpfkitError::Copy(format!(
                            "parsing manifest {}: {e}",
                            descriptor.digest()
                        ))
                    })?;
                for child in manifest_children(&manifest) {
                    if is_allowed(child.media_type(), allowed_media_types) {
                        next_level.push(child.clone());
                    } else {
                        tracing::debug!(
                            media_type = %child.media_type(),
                            digest = %child.digest(),
                            "skipping entry outside media-type allow-list"
                        );
                    }
                }
            }
        }
        frontier = next_level;
    }

    dest.tag(reference, root)
        .map_err(|e| BpfkitError::Copy(format!("tagging {reference}: {e}")))?;

    tracing::info!(reference, "copied artifact between stores");
    Ok(())
}

fn is_allowed(media_type: &MediaType, allowed: &[String]) -> bool {
    let media_type = media_type.to_string();
    allowed.iter().any(|a| a == &media_type)
}

fn manifest_children(manifest: &ImageManifest) -> impl Iterator<Item = &Descriptor> {
    std::iter::once(manifest.config()).chain(manifest.layers().iter())
}
