//! OCI artifact support.
//!
//! This module provides the content-addressable side of the pipeline:
//!
//! - a local store in the OCI image-layout format (`store`)
//! - packaging of compiled BPF programs into that store (`package`)
//! - filtered store-to-store copy for image synthesis (`copy`)
//!
//! # Layout
//!
//! ```text
//! store/
//! ├── oci-layout           (layout marker)
//! ├── index.json           (tagged manifests)
//! └── blobs/
//!     └── sha256/
//!         ├── <manifest>   (artifact manifest)
//!         ├── <config>     (created timestamp + platform tuple)
//!         └── <program>    (BPF ELF bytes)
//! ```

pub mod copy;
pub mod package;
pub mod store;

pub use copy::copy;
pub use package::{
    allowed_media_types, pull, push, BpfArtifact, CONFIG_MEDIA_TYPE, PROGRAM_MEDIA_TYPE,
};
pub use store::{OciStore, StoreError, REF_NAME_ANNOTATION};
