use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General bpfkit configuration
///
/// Every field doubles as the default for the matching CLI flag; values can
/// also be overridden through `BPFKIT_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Root directory of the local artifact store
    pub store_dir: PathBuf,

    /// Container image carrying the BPF build toolchain
    pub build_image: String,

    /// Executable used for container build/run commands
    pub builder: String,

    /// Base runner image for combined-image builds
    pub runner_image: String,

    /// Tag of the base runner image
    pub runner_tag: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            build_image: format!("ghcr.io/bpfkit/builder:{}", crate::VERSION),
            builder: "docker".to_string(),
            runner_image: "ghcr.io/bpfkit/runner".to_string(),
            runner_tag: crate::VERSION.to_string(),
        }
    }
}

impl GeneralConfig {
    /// Build a configuration from defaults plus `BPFKIT_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("BPFKIT_STORE_DIR") {
            config.store_dir = PathBuf::from(dir);
        }
        if let Ok(image) = std::env::var("BPFKIT_BUILD_IMAGE") {
            config.build_image = image;
        }
        if let Ok(builder) = std::env::var("BPFKIT_BUILDER") {
            config.builder = builder;
        }
        if let Ok(image) = std::env::var("BPFKIT_RUNNER_IMAGE") {
            config.runner_image = image;
        }
        if let Ok(tag) = std::env::var("BPFKIT_RUNNER_TAG") {
            config.runner_tag = tag;
        }
        config
    }
}

/// Return the default artifact store directory (`~/.bpfkit/store`).
pub fn default_store_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".bpfkit"))
        .unwrap_or_else(|| PathBuf::from(".bpfkit"))
        .join("store")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GeneralConfig::default();
        assert!(config.store_dir.ends_with("store"));
        assert!(config.build_image.starts_with("ghcr.io/bpfkit/builder:"));
        assert_eq!(config.builder, "docker");
        assert_eq!(config.runner_image, "ghcr.io/bpfkit/runner");
        assert_eq!(config.runner_tag, crate::VERSION);
    }

    #[test]
    fn test_build_image_pinned_to_version() {
        let config = GeneralConfig::default();
        assert!(config.build_image.ends_with(crate::VERSION));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = GeneralConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: GeneralConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.store_dir, config.store_dir);
        assert_eq!(parsed.build_image, config.build_image);
        assert_eq!(parsed.builder, config.builder);
    }

    #[test]
    fn test_default_store_dir_suffix() {
        let dir = default_store_dir();
        assert!(dir.ends_with(PathBuf::from(".bpfkit").join("store")) || dir.ends_with("store"));
    }
}
