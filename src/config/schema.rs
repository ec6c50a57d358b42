//! Configuration schema for layercache
//!
//! Configuration is stored at `~/.config/layercache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Container storage settings
    pub storage: StorageConfig,

    /// Cache defaults
    pub cache: CacheConfig,
}

impl Config {
    /// Reject values that would only fail later, deep inside a cache operation
    pub fn check(&self) -> Result<(), String> {
        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            return Err(format!(
                "general.log_format must be \"text\" or \"json\", got {:?}",
                self.general.log_format
            ));
        }
        for (key, program) in [
            ("storage.buildah", &self.storage.buildah),
            ("storage.podman", &self.storage.podman),
        ] {
            if program.trim().is_empty() {
                return Err(format!("{} must not be empty", key));
            }
        }
        for (key, dir) in [
            ("storage.root", &self.storage.root),
            ("storage.runroot", &self.storage.runroot),
        ] {
            if let Some(dir) = dir.as_ref().filter(|d| !d.is_absolute()) {
                return Err(format!("{} must be absolute, got {}", key, dir.display()));
            }
        }

        let ns = &self.cache.namespace;
        let component = !ns.is_empty()
            && ns != "."
            && ns != ".."
            && !ns.contains(['/', ':', '@'])
            && !ns.contains(char::is_whitespace);
        if !component {
            return Err(format!("cache.namespace {:?} is not a valid path component", ns));
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Container storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// buildah executable
    pub buildah: String,

    /// podman executable, used for change sets
    pub podman: String,

    /// Storage root (`--root`); the tools' default when unset
    pub root: Option<PathBuf>,

    /// Storage run root (`--runroot`)
    pub runroot: Option<PathBuf>,

    /// Storage driver (`--storage-driver`), e.g. "overlay"
    pub driver: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buildah: "buildah".to_string(),
            podman: "podman".to_string(),
            root: None,
            runroot: None,
            driver: None,
        }
    }
}

/// Cache defaults applied to CLI requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Namespace used when none is given on the command line
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
        }
    }
}
