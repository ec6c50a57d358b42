//! Mount request validation and cache entry naming

use crate::error::{LayerCacheError, LayerCacheResult};
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Argument map key recording the external bind directory of a container
pub const MOUNT_DIR_ARG: &str = "MOUNT_DIR";

/// Request to mount or release a cache entry
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    /// Cancelled when the caller abandons the operation
    pub cancel: CancellationToken,
    /// External transport-qualified image (e.g. `docker://quay.io/org/cache:latest`)
    pub image: Option<String>,
    /// Explicit working container name
    pub container_name: Option<String>,
    /// Absolute directory the cache gets bind-mounted onto
    pub mount_dir: Option<PathBuf>,
    /// Commit a new image revision on unmount
    pub commit: bool,
    /// Cache entry name within the namespace
    pub cache_name: Option<String>,
    /// Cache namespace
    pub cache_namespace: Option<String>,
}

impl MountOptions {
    /// Request for an internal cache entry
    pub fn cache(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            cache_namespace: Some(namespace.into()),
            cache_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    pub fn with_mount_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mount_dir = Some(dir.into());
        self
    }

    pub fn with_commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn image(&self) -> Option<&str> {
        non_empty(&self.image)
    }

    pub fn explicit_container_name(&self) -> Option<&str> {
        non_empty(&self.container_name)
    }

    pub fn cache_name(&self) -> Option<&str> {
        non_empty(&self.cache_name)
    }

    pub fn cache_namespace(&self) -> Option<&str> {
        non_empty(&self.cache_namespace)
    }

    pub fn mount_dir(&self) -> Option<&Path> {
        self.mount_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Check that the request addresses a cache entry
    pub fn validate(&self) -> LayerCacheResult<()> {
        if self.image().is_none() && self.cache_name().is_none() {
            return Err(LayerCacheError::invalid_request(
                "neither cache name nor image specified",
            ));
        }
        if let Some(dir) = self.mount_dir() {
            if !dir.is_absolute() {
                return Err(LayerCacheError::invalid_request(format!(
                    "non-absolute mount path {:?} provided",
                    dir
                )));
            }
        }
        Ok(())
    }

    /// Working container name for this request; empty when anonymous
    pub fn container_name(&self) -> LayerCacheResult<String> {
        derive_container_name(self.explicit_container_name(), self.mount_dir())
    }

    /// Qualified image name the cache entry is committed to
    pub fn cache_image_name(&self) -> String {
        cache_image_name(
            self.cache_namespace().unwrap_or_default(),
            self.cache_name().unwrap_or_default(),
        )
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Derive the working container name from an explicit name or a bind directory.
///
/// The bind directory is lexically cleaned first, so `/cache/npm/` and
/// `/cache/./npm` both yield `npm`. A directory without a usable final
/// segment (`/`, `/cache/..`, `.`) is rejected.
pub fn derive_container_name(
    explicit: Option<&str>,
    mount_dir: Option<&Path>,
) -> LayerCacheResult<String> {
    if let Some(name) = explicit.filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }
    let Some(dir) = mount_dir.filter(|d| !d.as_os_str().is_empty()) else {
        return Ok(String::new());
    };

    let cleaned = clean_path(dir);
    match cleaned.components().next_back() {
        Some(Component::Normal(base)) => {
            let base = base.to_string_lossy();
            if base.is_empty() {
                Err(underivable(dir))
            } else {
                Ok(base.into_owned())
            }
        }
        _ => Err(underivable(dir)),
    }
}

fn underivable(dir: &Path) -> LayerCacheError {
    LayerCacheError::invalid_request(format!(
        "cannot derive container name from provided mount path {:?}, requires sub directory",
        dir
    ))
}

/// Lexically normalise a path: drop `.` segments and fold `..` into its parent.
///
/// `..` at the root stays at the root, a leading `..` in a relative path is kept.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Qualified name of an internal cache image
pub fn cache_image_name(namespace: &str, name: &str) -> String {
    format!("localhost/cache/{}/{}:latest", namespace, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_image_or_cache_name() {
        let err = MountOptions::default().validate().unwrap_err();
        assert!(matches!(err, LayerCacheError::InvalidRequest(_)));

        let empty = MountOptions {
            image: Some(String::new()),
            cache_name: Some(String::new()),
            ..MountOptions::default()
        };
        assert!(matches!(
            empty.validate(),
            Err(LayerCacheError::InvalidRequest(_))
        ));

        assert!(MountOptions::cache("ns", "npm").validate().is_ok());
        assert!(MountOptions::default()
            .with_image("docker://alpine")
            .validate()
            .is_ok());
    }

    #[test]
    fn validate_rejects_relative_mount_dir() {
        for dir in ["cache", "./cache", "../cache", "cache/npm/"] {
            let opts = MountOptions::cache("ns", "npm").with_mount_dir(dir);
            assert!(
                matches!(opts.validate(), Err(LayerCacheError::InvalidRequest(_))),
                "{dir} should be rejected"
            );
        }
        let opts = MountOptions::cache("ns", "npm").with_mount_dir("/var/cache/npm");
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn container_name_prefers_explicit_name() {
        let opts = MountOptions::cache("ns", "npm")
            .with_container_name("build-42")
            .with_mount_dir("/var/cache/npm");
        assert_eq!(opts.container_name().unwrap(), "build-42");
    }

    #[test]
    fn container_name_from_mount_dir() {
        let cases = [
            ("/var/cache/npm", "npm"),
            ("/var/cache/npm/", "npm"),
            ("/var/cache/./npm", "npm"),
            ("/var/cache/npm/.", "npm"),
            ("/var/cache/go/../npm", "npm"),
            ("/npm", "npm"),
        ];
        for (dir, expected) in cases {
            let name = derive_container_name(None, Some(Path::new(dir))).unwrap();
            assert_eq!(name, expected, "derived from {dir}");
        }
    }

    #[test]
    fn container_name_rejects_traversal_and_root() {
        for dir in ["/", "/var/..", "/..", ".", "..", "/var/cache/../.."] {
            let result = derive_container_name(None, Some(Path::new(dir)));
            assert!(
                matches!(result, Err(LayerCacheError::InvalidRequest(_))),
                "{dir} should not yield a name, got {result:?}"
            );
        }
    }

    #[test]
    fn container_name_anonymous() {
        assert_eq!(derive_container_name(None, None).unwrap(), "");
        assert_eq!(derive_container_name(Some(""), None).unwrap(), "");
        assert_eq!(
            derive_container_name(None, Some(Path::new(""))).unwrap(),
            ""
        );
    }

    #[test]
    fn clean_path_folds_segments() {
        assert_eq!(clean_path(Path::new("/a/b/../c/./")), PathBuf::from("/a/c"));
        assert_eq!(clean_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(clean_path(Path::new("a/..")), PathBuf::from("."));
        assert_eq!(clean_path(Path::new("../a")), PathBuf::from("../a"));
    }

    #[test]
    fn cache_image_name_format() {
        assert_eq!(
            cache_image_name("ci", "cargo-registry"),
            "localhost/cache/ci/cargo-registry:latest"
        );
        assert_eq!(
            MountOptions::cache("ci", "npm").cache_image_name(),
            "localhost/cache/ci/npm:latest"
        );
    }
}
