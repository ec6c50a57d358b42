//! Configuration loading for layercache
//!
//! A single TOML file selected by `--config`, `LAYERCACHE_CONFIG`, or the
//! platform config directory. A missing file means defaults.

pub mod schema;

pub use schema::Config;

use crate::error::{LayerCacheError, LayerCacheResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Result of writing a default configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Written,
    /// A file was already present and left untouched
    Kept,
}

/// Locates, reads and initializes the configuration file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Use `explicit` when given, otherwise `<config dir>/layercache/config.toml`
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        let config_path = explicit.unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("layercache")
                .join("config.toml")
        });
        Self { config_path }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self::resolve(Some(path))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Read and check the configuration; defaults when the file is absent
    pub async fn load(&self) -> LayerCacheResult<Config> {
        let content = match fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.config_path.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(LayerCacheError::io(
                    format!("reading config from {}", self.config_path.display()),
                    e,
                ))
            }
        };

        let config: Config = toml::from_str(&content).map_err(|e| self.invalid(e.to_string()))?;
        config.check().map_err(|reason| self.invalid(reason))?;
        Ok(config)
    }

    /// Write the default configuration unless a file exists and `force` is unset
    pub async fn init(&self, force: bool) -> LayerCacheResult<InitOutcome> {
        if !force && fs::try_exists(&self.config_path).await.unwrap_or(false) {
            return Ok(InitOutcome::Kept);
        }

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LayerCacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let content = toml::to_string_pretty(&Config::default())?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            LayerCacheError::io(format!("writing config to {}", self.config_path.display()), e)
        })?;
        Ok(InitOutcome::Written)
    }

    fn invalid(&self, reason: String) -> LayerCacheError {
        LayerCacheError::ConfigInvalid {
            path: self.config_path.clone(),
            reason,
        }
    }
}
