//! Container storage collaborators
//!
//! The cache lifecycle only talks to image and container storage through
//! the [`ContainerStore`] trait:
//! - [`BuildahStore`]: drives `buildah` (and `podman diff`) on the host

mod buildah;
pub mod factory;
#[cfg(test)]
pub(crate) mod memory;

pub use buildah::BuildahStore;
pub use factory::{create_store, Platform};

use crate::cache::image::ImageReference;
use crate::error::LayerCacheResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// When the builder may pull the base image from a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPolicy {
    Always,
    Never,
}

impl PullPolicy {
    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
        }
    }
}

/// Process isolation of the working container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Plain chroot; works without privileges for layer mounting
    Chroot,
}

impl Isolation {
    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Chroot => "chroot",
        }
    }
}

/// Settings for creating a working container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderOptions {
    /// Container name; empty lets the storage pick one
    pub container: String,
    /// Base image name, `scratch` for an empty file system
    pub from_image: String,
    pub pull_policy: PullPolicy,
    pub isolation: Isolation,
    pub network_disabled: bool,
}

impl BuilderOptions {
    /// Options for a cache container: no network, chroot isolation
    pub fn cache_container(
        container: impl Into<String>,
        from_image: impl Into<String>,
        pull_policy: PullPolicy,
    ) -> Self {
        Self {
            container: container.into(),
            from_image: from_image.into(),
            pull_policy,
            isolation: Isolation::Chroot,
            network_disabled: true,
        }
    }
}

/// A working container held by the storage service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingContainer {
    pub id: String,
    pub name: String,
    /// Image the container was created from; `None` for scratch
    pub from_image_id: Option<String>,
    pub mount_label: Option<String>,
    pub mount_point: Option<PathBuf>,
    /// Persisted key-value arguments, written back with [`ContainerStore::save`]
    pub args: HashMap<String, String>,
}

impl WorkingContainer {
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Short ID for log output
    pub fn short_id(&self) -> &str {
        &self.id[..12.min(self.id.len())]
    }
}

/// Kind of a file system change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// A path changed between a container's base image and its top layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub kind: ChangeKind,
}

/// Result of committing a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutput {
    pub image_id: String,
    /// Canonical `name@digest` reference, when the storage reports one
    pub reference: Option<String>,
}

/// Image and container storage operations the cache lifecycle depends on
///
/// Implementations classify a missing image or container as
/// [`crate::error::LayerCacheError::NotFound`].
#[async_trait]
pub trait ContainerStore: Send + Sync {
    /// Create a working container, pulling its base image per policy
    async fn create(&self, options: &BuilderOptions) -> LayerCacheResult<WorkingContainer>;

    /// Find a working container by name or ID
    async fn open(&self, name: &str) -> LayerCacheResult<WorkingContainer>;

    /// Find the working container mounted at or bound to `path`
    async fn open_by_path(&self, path: &Path) -> LayerCacheResult<WorkingContainer>;

    /// Mount the container's top layer and return the mount point
    async fn mount(
        &self,
        container: &WorkingContainer,
        label: Option<&str>,
    ) -> LayerCacheResult<PathBuf>;

    async fn unmount(&self, container: &WorkingContainer) -> LayerCacheResult<()>;

    /// Persist the container's argument map
    async fn save(&self, container: &WorkingContainer) -> LayerCacheResult<()>;

    /// Changes between the container's base image and its top layer, ordered by path
    async fn changes(&self, container: &WorkingContainer) -> LayerCacheResult<Vec<Change>>;

    /// Commit the container to a new image tagged `target`
    async fn commit(
        &self,
        container: &WorkingContainer,
        target: &ImageReference,
    ) -> LayerCacheResult<CommitOutput>;

    /// Push a stored image to `destination`
    async fn push(&self, image_id: &str, destination: &ImageReference) -> LayerCacheResult<()>;

    async fn delete(&self, container: &WorkingContainer) -> LayerCacheResult<()>;

    /// Remove leftover containers and dangling images
    async fn prune(&self) -> LayerCacheResult<()>;

    /// Release the storage handle
    fn free(&self) {}

    /// Human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
impl<T: ContainerStore + ?Sized> ContainerStore for Arc<T> {
    async fn create(&self, options: &BuilderOptions) -> LayerCacheResult<WorkingContainer> {
        (**self).create(options).await
    }

    async fn open(&self, name: &str) -> LayerCacheResult<WorkingContainer> {
        (**self).open(name).await
    }

    async fn open_by_path(&self, path: &Path) -> LayerCacheResult<WorkingContainer> {
        (**self).open_by_path(path).await
    }

    async fn mount(
        &self,
        container: &WorkingContainer,
        label: Option<&str>,
    ) -> LayerCacheResult<PathBuf> {
        (**self).mount(container, label).await
    }

    async fn unmount(&self, container: &WorkingContainer) -> LayerCacheResult<()> {
        (**self).unmount(container).await
    }

    async fn save(&self, container: &WorkingContainer) -> LayerCacheResult<()> {
        (**self).save(container).await
    }

    async fn changes(&self, container: &WorkingContainer) -> LayerCacheResult<Vec<Change>> {
        (**self).changes(container).await
    }

    async fn commit(
        &self,
        container: &WorkingContainer,
        target: &ImageReference,
    ) -> LayerCacheResult<CommitOutput> {
        (**self).commit(container, target).await
    }

    async fn push(&self, image_id: &str, destination: &ImageReference) -> LayerCacheResult<()> {
        (**self).push(image_id, destination).await
    }

    async fn delete(&self, container: &WorkingContainer) -> LayerCacheResult<()> {
        (**self).delete(container).await
    }

    async fn prune(&self) -> LayerCacheResult<()> {
        (**self).prune().await
    }

    fn free(&self) {
        (**self).free()
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_container_options() {
        let opts = BuilderOptions::cache_container("npm", "scratch", PullPolicy::Never);
        assert!(opts.network_disabled);
        assert_eq!(opts.isolation, Isolation::Chroot);
        assert_eq!(opts.pull_policy.as_flag(), "never");
    }

    #[test]
    fn container_arg_ignores_empty_values() {
        let mut container = WorkingContainer::default();
        container.args.insert("MOUNT_DIR".to_string(), String::new());
        assert_eq!(container.arg("MOUNT_DIR"), None);
        container
            .args
            .insert("MOUNT_DIR".to_string(), "/var/cache/npm".to_string());
        assert_eq!(container.arg("MOUNT_DIR"), Some("/var/cache/npm"));
    }

    #[test]
    fn short_id_truncates() {
        let container = WorkingContainer {
            id: "0123456789abcdef".to_string(),
            ..WorkingContainer::default()
        };
        assert_eq!(container.short_id(), "0123456789ab");
    }
}
