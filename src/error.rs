//! Error types for layercache
//!
//! All modules use `LayerCacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for layercache operations
pub type LayerCacheResult<T> = Result<T, LayerCacheError>;

/// All errors that can occur in layercache
#[derive(Error, Debug)]
pub enum LayerCacheError {
    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid image reference {reference:?}: {reason}")]
    InvalidImageReference { reference: String, reason: String },

    // Storage errors
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("Failed to acquire cache container from {image}")]
    AcquisitionFailed {
        image: String,
        #[source]
        source: Box<LayerCacheError>,
    },

    #[error("Failed to commit cache image {image}")]
    CommitFailed {
        image: String,
        #[source]
        source: Box<LayerCacheError>,
    },

    #[error("Failed to push image {image_id} to {destination}")]
    PushFailed {
        image_id: String,
        destination: String,
        #[source]
        source: Box<LayerCacheError>,
    },

    #[error("Cleanup failed: {step}")]
    CleanupFailed {
        step: String,
        #[source]
        source: Box<LayerCacheError>,
    },

    #[error("Unsupported platform: {0}. Bind mounts require Linux.")]
    UnsupportedPlatform(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl LayerCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            name: name.into(),
        }
    }

    /// Wrap a failed compensation or teardown step
    pub fn cleanup(step: impl Into<String>, source: LayerCacheError) -> Self {
        Self::CleanupFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Whether the storage collaborator reported a missing image or container
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionFailed { .. } | Self::PushFailed { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidRequest(_) => Some("Pass --cache-name/--namespace or --image"),
            Self::InvalidImageReference { .. } => {
                Some("Use a transport prefix, e.g. docker://quay.io/org/cache:latest")
            }
            Self::CommandFailed { .. } => Some("Is buildah installed and on PATH?"),
            Self::UnsupportedPlatform(_) => Some("Run layercache on a Linux host"),
            _ if self.is_retryable() => Some("Registry or storage may be busy, retry the command"),
            _ => None,
        }
    }
}
