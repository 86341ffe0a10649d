//! Local content-addressable store in the OCI image-layout format.
//!
//! Blobs are addressed by `sha256:<hex>` digest under `blobs/sha256/`;
//! tagged manifests live as descriptors in `index.json`, keyed by the
//! ref-name annotation. The store knows nothing about artifact semantics;
//! packaging and copying sit on top of it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use oci_spec::image::{Descriptor, DescriptorBuilder, ImageIndex, ImageIndexBuilder, MediaType};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Annotation key carrying the reference a manifest was tagged under.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

const OCI_LAYOUT_FILE: &str = "oci-layout";
const OCI_LAYOUT_CONTENT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;
const INDEX_FILE: &str = "index.json";

/// Errors from store-level operations.
///
/// Callers fold these into the stage taxonomy (`Package` or `Copy`)
/// depending on which pipeline stage touched the store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid store document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Spec(String),

    #[error("not an OCI layout: {0}")]
    InvalidLayout(String),

    #[error("reference not found: {0}")]
    NotFound(String),

    #[error("blob not found: {0}")]
    BlobNotFound(String),
}

/// A store rooted at a local directory in the OCI image-layout format.
#[derive(Debug, Clone)]
pub struct OciStore {
    root: PathBuf,
}

impl OciStore {
    /// Open a store, creating the layout when the directory is empty or absent.
    ///
    /// An existing directory must carry a valid `oci-layout` marker.
    pub fn open_or_create(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let marker = root.join(OCI_LAYOUT_FILE);

        std::fs::create_dir_all(root.join("blobs").join("sha256"))?;

        if marker.exists() {
            let content = std::fs::read_to_string(&marker)?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .map_err(|_| StoreError::InvalidLayout(root.display().to_string()))?;
            if value.get("imageLayoutVersion").and_then(|v| v.as_str()).is_none() {
                return Err(StoreError::InvalidLayout(root.display().to_string()));
            }
        } else {
            std::fs::write(&marker, OCI_LAYOUT_CONTENT)?;
        }

        let store = Self { root };
        if !store.index_path().exists() {
            store.save_index(Vec::new())?;
        }
        Ok(store)
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a blob, returning its `sha256:` digest and size.
    ///
    /// Writing the same content twice is a no-op.
    pub fn write_blob(&self, bytes: &[u8]) -> Result<(String, i64), StoreError> {
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(bytes)));
        let path = self.blob_path(&digest);
        if !path.exists() {
            std::fs::write(&path, bytes)?;
        }
        Ok((digest, bytes.len() as i64))
    }

    /// Read a blob by digest.
    pub fn read_blob(&self, digest: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.blob_path(digest);
        if !path.exists() {
            return Err(StoreError::BlobNotFound(digest.to_string()));
        }
        Ok(std::fs::read(path)?)
    }

    /// Whether a blob with the given digest exists.
    pub fn has_blob(&self, digest: &str) -> bool {
        self.blob_path(digest).exists()
    }

    /// Resolve a reference to its tagged manifest descriptor.
    pub fn resolve(&self, reference: &str) -> Result<Descriptor, StoreError> {
        let index = self.load_index()?;
        index
            .manifests()
            .iter()
            .find(|d| descriptor_reference(d) == Some(reference))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(reference.to_string()))
    }

    /// Tag a manifest descriptor under `reference`, replacing any prior tag.
    pub fn tag(&self, reference: &str, descriptor: Descriptor) -> Result<(), StoreError> {
        let mut annotations = descriptor
            .annotations()
            .clone()
            .unwrap_or_default();
        annotations.insert(REF_NAME_ANNOTATION.to_string(), reference.to_string());

        let tagged = DescriptorBuilder::default()
            .media_type(descriptor.media_type().clone())
            .digest(descriptor.digest().clone())
            .size(descriptor.size())
            .annotations(annotations)
            .build()
            .map_err(|e| StoreError::Spec(e.to_string()))?;

        let index = self.load_index()?;
        let mut manifests: Vec<Descriptor> = index
            .manifests()
            .iter()
            .filter(|d| descriptor_reference(d) != Some(reference))
            .cloned()
            .collect();
        manifests.push(tagged);
        self.save_index(manifests)
    }

    /// List all tagged references in the store.
    pub fn references(&self) -> Result<Vec<String>, StoreError> {
        let index = self.load_index()?;
        Ok(index
            .manifests()
            .iter()
            .filter_map(|d| descriptor_reference(d).map(str::to_string))
            .collect())
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        let hex_part = digest.strip_prefix("sha256:").unwrap_or(digest);
        self.root.join("blobs").join("sha256").join(hex_part)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn load_index(&self) -> Result<ImageIndex, StoreError> {
        let content = std::fs::read_to_string(self.index_path())?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_index(&self, manifests: Vec<Descriptor>) -> Result<(), StoreError> {
        let index = ImageIndexBuilder::default()
            .schema_version(2u32)
            .media_type(MediaType::ImageIndex)
            .manifests(manifests)
            .build()
            .map_err(|e| StoreError::Spec(e.to_string()))?;
        std::fs::write(self.index_path(), serde_json::to_vec_pretty(&index)?)?;
        Ok(())
    }
}

/// The reference a descriptor is tagged under, if any.
fn descriptor_reference(descriptor: &Descriptor) -> Option<&str> {
    descriptor
        .annotations()
        .as_ref()
        .and_then(|a| a.get(REF_NAME_ANNOTATION))
        .map(String::as_str)
}

/// Build a descriptor for a blob with extra annotations.
pub(crate) fn blob_descriptor(
    media_type: MediaType,
    digest: String,
    size: i64,
    annotations: Option<HashMap<String, String>>,
) -> Result<Descriptor, StoreError> {
    let mut builder = DescriptorBuilder::default()
        .media_type(media_type)
        .digest(digest)
        .size(size);
    if let Some(annotations) = annotations {
        builder = builder.annotations(annotations);
    }
    builder.build().map_err(|e| StoreError::Spec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_or_create_writes_layout() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store");
        let store = OciStore::open_or_create(&root).unwrap();
        assert!(root.join("oci-layout").exists());
        assert!(root.join("index.json").exists());
        assert!(root.join("blobs/sha256").is_dir());
        assert_eq!(store.references().unwrap().len(), 0);
    }

    #[test]
    fn test_open_existing_store() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store");
        {
            let store = OciStore::open_or_create(&root).unwrap();
            store.write_blob(b"payload").unwrap();
        }
        let reopened = OciStore::open_or_create(&root).unwrap();
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(b"payload")));
        assert!(reopened.has_blob(&digest));
    }

    #[test]
    fn test_open_rejects_invalid_marker() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("oci-layout"), "not a layout marker").unwrap();
        let result = OciStore::open_or_create(&root);
        assert!(matches!(result, Err(StoreError::InvalidLayout(_))));
    }

    #[test]
    fn test_blob_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = OciStore::open_or_create(tmp.path()).unwrap();

        let (digest, size) = store.write_blob(b"bpf bytes").unwrap();
        assert!(digest.starts_with("sha256:"));
        assert_eq!(size, 9);
        assert!(store.has_blob(&digest));
        assert_eq!(store.read_blob(&digest).unwrap(), b"bpf bytes");
    }

    #[test]
    fn test_write_blob_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = OciStore::open_or_create(tmp.path()).unwrap();
        let (first, _) = store.write_blob(b"same").unwrap();
        let (second, _) = store.write_blob(b"same").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_missing_blob() {
        let tmp = TempDir::new().unwrap();
        let store = OciStore::open_or_create(tmp.path()).unwrap();
        let result = store.read_blob("sha256:deadbeef");
        assert!(matches!(result, Err(StoreError::BlobNotFound(_))));
    }

    #[test]
    fn test_tag_and_resolve() {
        let tmp = TempDir::new().unwrap();
        let store = OciStore::open_or_create(tmp.path()).unwrap();
        let (digest, size) = store.write_blob(b"{}").unwrap();
        let descriptor =
            blob_descriptor(MediaType::ImageManifest, digest.clone(), size, None).unwrap();

        store.tag("local/foo:v1", descriptor).unwrap();

        let resolved = store.resolve("local/foo:v1").unwrap();
        assert_eq!(resolved.digest(), &digest);
        assert_eq!(
            store.references().unwrap(),
            vec!["local/foo:v1".to_string()]
        );
    }

    #[test]
    fn test_tag_overwrites_prior_reference() {
        let tmp = TempDir::new().unwrap();
        let store = OciStore::open_or_create(tmp.path()).unwrap();

        let (first_digest, first_size) = store.write_blob(b"first").unwrap();
        let (second_digest, second_size) = store.write_blob(b"second").unwrap();

        store
            .tag(
                "local/foo:v1",
                blob_descriptor(MediaType::ImageManifest, first_digest, first_size, None)
                    .unwrap(),
            )
            .unwrap();
        store
            .tag(
                "local/foo:v1",
                blob_descriptor(
                    MediaType::ImageManifest,
                    second_digest.clone(),
                    second_size,
                    None,
                )
                .unwrap(),
            )
            .unwrap();

        let resolved = store.resolve("local/foo:v1").unwrap();
        assert_eq!(resolved.digest(), &second_digest);
        assert_eq!(store.references().unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_missing_reference() {
        let tmp = TempDir::new().unwrap();
        let store = OciStore::open_or_create(tmp.path()).unwrap();
        let result = store.resolve("local/missing:v1");
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
