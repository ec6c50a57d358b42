//! Image reference parsing and cache image resolution
//!
//! A cache entry is addressed either by an internal cache name
//! (`localhost/cache/<namespace>/<name>:latest` in local container storage)
//! or by an explicit transport-qualified image such as
//! `docker://quay.io/org/cache:latest`.

use crate::cache::options::MountOptions;
use crate::error::{LayerCacheError, LayerCacheResult};
use crate::storage::PullPolicy;
use std::fmt;
use std::str::FromStr;

/// Name of the empty base image
pub const SCRATCH: &str = "scratch";

const DEFAULT_DOMAIN: &str = "docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const DEFAULT_TAG: &str = "latest";

/// Image transports understood by the container tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Docker,
    ContainersStorage,
    Oci,
    OciArchive,
    DockerArchive,
    DockerDaemon,
    Dir,
}

impl Transport {
    const ALL: [Transport; 7] = [
        Transport::Docker,
        Transport::ContainersStorage,
        Transport::Oci,
        Transport::OciArchive,
        Transport::DockerArchive,
        Transport::DockerDaemon,
        Transport::Dir,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::ContainersStorage => "containers-storage",
            Self::Oci => "oci",
            Self::OciArchive => "oci-archive",
            Self::DockerArchive => "docker-archive",
            Self::DockerDaemon => "docker-daemon",
            Self::Dir => "dir",
        }
    }

    /// Whether the reference part is a registry-style image name
    fn has_docker_reference(&self) -> bool {
        matches!(
            self,
            Self::Docker | Self::ContainersStorage | Self::DockerDaemon
        )
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A transport-qualified image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    transport: Transport,
    /// Normalised registry name, or the raw path for file based transports
    name: String,
}

impl ImageReference {
    /// Parse `transport:reference`, e.g. `docker://alpine` or `oci:/srv/layout:tag`
    pub fn parse(input: &str) -> LayerCacheResult<Self> {
        let invalid = |reason: &str| LayerCacheError::InvalidImageReference {
            reference: input.to_string(),
            reason: reason.to_string(),
        };

        let (prefix, rest) = input
            .split_once(':')
            .ok_or_else(|| invalid("missing transport prefix"))?;
        let transport = Transport::ALL
            .into_iter()
            .find(|t| t.name() == prefix)
            .ok_or_else(|| invalid("unknown transport"))?;

        let rest = if transport == Transport::Docker {
            rest.strip_prefix("//")
                .ok_or_else(|| invalid("docker references must start with //"))?
        } else {
            rest
        };
        if rest.is_empty() {
            return Err(invalid("empty image name"));
        }

        let name = if transport.has_docker_reference() {
            normalize_name(rest).map_err(|reason| invalid(reason.as_str()))?
        } else {
            rest.to_string()
        };
        Ok(Self { transport, name })
    }

    /// Reference to an image in local container storage
    pub fn local(name: &str) -> LayerCacheResult<Self> {
        let name = normalize_name(name).map_err(|reason| {
            LayerCacheError::InvalidImageReference {
                reference: name.to_string(),
                reason,
            }
        })?;
        Ok(Self {
            transport: Transport::ContainersStorage,
            name,
        })
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Registry-style name (`docker.io/library/alpine:latest`), when the transport has one
    pub fn docker_reference(&self) -> Option<&str> {
        self.transport
            .has_docker_reference()
            .then_some(self.name.as_str())
    }

    /// Name to hand to the container builder as its base image
    pub fn base_image_name(&self) -> String {
        match self.docker_reference() {
            Some(name) => name.to_string(),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transport {
            Transport::Docker => write!(f, "docker://{}", self.name),
            t => write!(f, "{}:{}", t, self.name),
        }
    }
}

impl FromStr for ImageReference {
    type Err = LayerCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Fully qualify a registry image name with domain and tag.
///
/// `alpine` becomes `docker.io/library/alpine:latest`; names carrying a
/// digest keep it and get no default tag.
pub fn normalize_name(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("empty image name".to_string());
    }
    if raw == SCRATCH {
        return Ok(SCRATCH.to_string());
    }

    let (remainder, digest) = match raw.split_once('@') {
        Some((name, digest)) => {
            validate_digest(digest)?;
            (name, Some(digest))
        }
        None => (raw, None),
    };

    // A tag separator is a colon after the last slash, not a registry port.
    let (path, tag) = match remainder.rfind(':') {
        Some(idx) if !remainder[idx..].contains('/') => {
            (&remainder[..idx], Some(&remainder[idx + 1..]))
        }
        _ => (remainder, None),
    };
    if let Some(tag) = tag {
        validate_tag(tag)?;
    }

    let (domain, repo) = split_domain(path);
    validate_repository(&repo)?;

    let mut name = format!("{}/{}", domain, repo);
    match (tag, digest) {
        (Some(tag), _) => {
            name.push(':');
            name.push_str(tag);
        }
        (None, None) => {
            name.push(':');
            name.push_str(DEFAULT_TAG);
        }
        (None, Some(_)) => {}
    }
    if let Some(digest) = digest {
        name.push('@');
        name.push_str(digest);
    }
    Ok(name)
}

fn split_domain(path: &str) -> (String, String) {
    match path.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        }
        Some(_) => (DEFAULT_DOMAIN.to_string(), path.to_string()),
        None => (
            DEFAULT_DOMAIN.to_string(),
            format!("{}{}", OFFICIAL_REPO_PREFIX, path),
        ),
    }
}

fn validate_repository(repo: &str) -> Result<(), String> {
    for component in repo.split('/') {
        let valid = !component.is_empty()
            && component
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c))
            && component
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(format!("invalid repository path component {:?}", component));
        }
    }
    Ok(())
}

fn validate_tag(tag: &str) -> Result<(), String> {
    let valid = !tag.is_empty()
        && tag.len() <= 128
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
        && !tag.starts_with(['.', '-']);
    if valid {
        Ok(())
    } else {
        Err(format!("invalid tag {:?}", tag))
    }
}

fn validate_digest(digest: &str) -> Result<(), String> {
    match digest.split_once(':') {
        Some((algorithm, hex))
            if !algorithm.is_empty()
                && hex.len() >= 32
                && hex.chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            Ok(())
        }
        _ => Err(format!("invalid digest {:?}", digest)),
    }
}

/// Image a mount request seeds its container from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub reference: ImageReference,
    pub pull_policy: PullPolicy,
}

impl ResolvedImage {
    /// Name handed to the container builder
    pub fn name(&self) -> String {
        self.reference.base_image_name()
    }
}

/// Resolve the image a mount request starts from.
///
/// Explicit images are always pulled; internal cache images only ever come
/// from local storage.
pub fn resolve_source(opts: &MountOptions) -> LayerCacheResult<ResolvedImage> {
    match opts.image() {
        Some(image) => Ok(ResolvedImage {
            reference: ImageReference::parse(image)?,
            pull_policy: PullPolicy::Always,
        }),
        None => Ok(ResolvedImage {
            reference: cache_reference(opts)?,
            pull_policy: PullPolicy::Never,
        }),
    }
}

/// Reference new cache revisions are committed to
pub fn cache_reference(opts: &MountOptions) -> LayerCacheResult<ImageReference> {
    if opts.cache_name().is_none() || opts.cache_namespace().is_none() {
        return Err(LayerCacheError::invalid_request(
            "cache name and namespace must be specified",
        ));
    }
    ImageReference::local(&opts.cache_image_name())
}
