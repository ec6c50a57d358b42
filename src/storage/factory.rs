//! Store factory for the host platform
//!
//! Bind mounts and the buildah storage driver are Linux-only, so every
//! other platform is rejected up front.

use crate::config::schema::StorageConfig;
use crate::error::{LayerCacheError, LayerCacheResult};
use crate::storage::{BuildahStore, ContainerStore};

/// Detected platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux - buildah against local container storage
    Linux,
    /// Anything else
    Unsupported,
}

impl Platform {
    /// Detect the current platform
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux,
            _ => Platform::Unsupported,
        }
    }

    /// Get a human-readable platform name
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::Unsupported => "Unsupported",
        }
    }
}

/// Create a container store appropriate for the current platform
pub fn create_store(config: &StorageConfig) -> LayerCacheResult<Box<dyn ContainerStore>> {
    match Platform::detect() {
        Platform::Linux => Ok(Box::new(BuildahStore::new(config.clone()))),
        Platform::Unsupported => Err(LayerCacheError::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        )),
    }
}
