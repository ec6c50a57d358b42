//! Container storage through the buildah command line
//!
//! Implements the ContainerStore trait by running `buildah` against the
//! host's containers-storage. Change sets come from `podman diff`, which
//! reads the same storage.

use super::{BuilderOptions, Change, ChangeKind, CommitOutput, ContainerStore, WorkingContainer};
use crate::cache::image::ImageReference;
use crate::config::schema::StorageConfig;
use crate::error::{LayerCacheError, LayerCacheResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Annotation prefix under which the argument map is persisted
const ARG_ANNOTATION_PREFIX: &str = "io.layercache.arg.";

/// stderr fragments buildah and podman emit for a missing image
const IMAGE_MISSING: &[&str] = &[
    "manifest unknown",
    "could not be found locally",
    "image not known",
    "no such image",
    "name unknown",
];

/// stderr fragments for a missing container
const CONTAINER_MISSING: &[&str] = &["container not known", "no such container"];

/// Container store driving the buildah CLI
#[derive(Debug, Clone)]
pub struct BuildahStore {
    config: StorageConfig,
}

impl BuildahStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Storage flags shared by buildah and podman
    fn storage_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(root) = &self.config.root {
            args.push("--root".to_string());
            args.push(root.display().to_string());
        }
        if let Some(runroot) = &self.config.runroot {
            args.push("--runroot".to_string());
            args.push(runroot.display().to_string());
        }
        if let Some(driver) = &self.config.driver {
            args.push("--storage-driver".to_string());
            args.push(driver.clone());
        }
        args
    }

    async fn run(&self, program: &str, args: &[&str]) -> LayerCacheResult<std::process::Output> {
        let mut full: Vec<String> = self.storage_args();
        full.extend(args.iter().map(|a| a.to_string()));
        debug!("Executing: {} {:?}", program, full);

        Command::new(program)
            .args(&full)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| LayerCacheError::command_failed(format!("{} {:?}", program, args), e))
    }

    /// Run buildah and return stdout, mapping failures with `classify`
    async fn buildah(
        &self,
        args: &[&str],
        classify: impl FnOnce(&str) -> Option<LayerCacheError>,
    ) -> LayerCacheResult<String> {
        let output = self.run(&self.config.buildah, args).await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify(&stderr).unwrap_or_else(|| {
            LayerCacheError::command_exec(format!("buildah {}", args.join(" ")), stderr)
        }))
    }

    async fn inspect(&self, name: &str) -> LayerCacheResult<WorkingContainer> {
        let json = self
            .buildah(&["inspect", "--type", "container", name], |stderr| {
                missing(stderr, CONTAINER_MISSING).then(|| LayerCacheError::not_found("container", name))
            })
            .await?;
        parse_inspect(&json)
    }

    async fn set_annotation(&self, id: &str, annotation: &str) -> LayerCacheResult<()> {
        self.buildah(&["config", "--annotation", annotation, id], |_| None)
            .await
            .map(|_| ())
    }
}

fn missing(stderr: &str, patterns: &[&str]) -> bool {
    let lower = stderr.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectOutput {
    #[serde(rename = "ContainerID")]
    container_id: String,
    #[serde(default)]
    container: String,
    #[serde(rename = "FromImageID", default)]
    from_image_id: String,
    #[serde(default)]
    mount_label: String,
    #[serde(default)]
    mount_point: String,
    #[serde(default)]
    image_annotations: Option<HashMap<String, String>>,
}

fn parse_inspect(json: &str) -> LayerCacheResult<WorkingContainer> {
    let out: InspectOutput = serde_json::from_str(json)?;
    let args = out
        .image_annotations
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(ARG_ANNOTATION_PREFIX)
                .map(|key| (key.to_string(), v))
        })
        .collect();

    Ok(WorkingContainer {
        id: out.container_id,
        name: out.container,
        from_image_id: Some(out.from_image_id).filter(|id| !id.is_empty()),
        mount_label: Some(out.mount_label).filter(|l| !l.is_empty()),
        mount_point: Some(out.mount_point)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from),
        args,
    })
}

#[derive(Debug, Deserialize)]
struct ContainerListEntry {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct DiffOutput {
    #[serde(default)]
    changed: Vec<String>,
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    deleted: Vec<String>,
}

fn parse_diff(json: &str) -> LayerCacheResult<Vec<Change>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let diff: DiffOutput = serde_json::from_str(json)?;
    let mut changes: Vec<Change> = diff
        .added
        .into_iter()
        .map(|path| Change {
            path,
            kind: ChangeKind::Added,
        })
        .chain(diff.changed.into_iter().map(|path| Change {
            path,
            kind: ChangeKind::Modified,
        }))
        .chain(diff.deleted.into_iter().map(|path| Change {
            path,
            kind: ChangeKind::Deleted,
        }))
        .collect();
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(changes)
}

/// Last non-empty line; buildah prints progress before the result
fn last_line(stdout: &str) -> &str {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
}

#[async_trait]
impl ContainerStore for BuildahStore {
    async fn create(&self, options: &BuilderOptions) -> LayerCacheResult<WorkingContainer> {
        let pull = format!("--pull={}", options.pull_policy.as_flag());
        let mut args = vec!["from", "--quiet", pull.as_str()];
        if !options.container.is_empty() {
            args.extend(["--name", options.container.as_str()]);
        }
        args.extend(["--isolation", options.isolation.as_flag()]);
        if options.network_disabled {
            args.extend(["--network", "none"]);
        }
        args.push(options.from_image.as_str());

        let image = options.from_image.clone();
        let stdout = self
            .buildah(&args, |stderr| {
                missing(stderr, IMAGE_MISSING).then(|| LayerCacheError::not_found("image", image))
            })
            .await?;
        let container = last_line(&stdout).to_string();
        info!(container = %container, image = %options.from_image, "created cache container");
        self.inspect(&container).await
    }

    async fn open(&self, name: &str) -> LayerCacheResult<WorkingContainer> {
        self.inspect(name).await
    }

    async fn open_by_path(&self, path: &Path) -> LayerCacheResult<WorkingContainer> {
        let json = self.buildah(&["containers", "--json"], |_| None).await?;
        let entries: Vec<ContainerListEntry> = if json.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&json)?
        };

        for entry in entries {
            let container = match self.inspect(&entry.id).await {
                Ok(c) => c,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            let bound = container
                .arg(crate::cache::options::MOUNT_DIR_ARG)
                .map(Path::new)
                == Some(path);
            if bound || container.mount_point.as_deref() == Some(path) {
                return Ok(container);
            }
        }
        Err(LayerCacheError::not_found(
            "container",
            path.display().to_string(),
        ))
    }

    async fn mount(
        &self,
        container: &WorkingContainer,
        label: Option<&str>,
    ) -> LayerCacheResult<PathBuf> {
        // buildah applies the container's own mount label
        if let Some(label) = label {
            debug!(container = %container.short_id(), label, "mounting with container label");
        }
        let stdout = self
            .buildah(&["mount", container.id.as_str()], |stderr| {
                missing(stderr, CONTAINER_MISSING)
                    .then(|| LayerCacheError::not_found("container", container.id.as_str()))
            })
            .await?;
        Ok(PathBuf::from(last_line(&stdout)))
    }

    async fn unmount(&self, container: &WorkingContainer) -> LayerCacheResult<()> {
        self.buildah(&["umount", container.id.as_str()], |_| None)
            .await
            .map(|_| ())
    }

    async fn save(&self, container: &WorkingContainer) -> LayerCacheResult<()> {
        for (key, value) in &container.args {
            let annotation = format!("{}{}={}", ARG_ANNOTATION_PREFIX, key, value);
            self.set_annotation(&container.id, &annotation).await?;
        }
        Ok(())
    }

    async fn changes(&self, container: &WorkingContainer) -> LayerCacheResult<Vec<Change>> {
        let output = self
            .run(
                &self.config.podman,
                &["diff", "--format", "json", container.id.as_str()],
            )
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LayerCacheError::command_exec("podman diff", stderr));
        }
        parse_diff(&String::from_utf8_lossy(&output.stdout))
    }

    async fn commit(
        &self,
        container: &WorkingContainer,
        target: &ImageReference,
    ) -> LayerCacheResult<CommitOutput> {
        // Bookkeeping annotations stay out of the committed image.
        for key in container.args.keys() {
            let annotation = format!("{}{}-", ARG_ANNOTATION_PREFIX, key);
            self.set_annotation(&container.id, &annotation).await?;
        }

        let target_name = target.to_string();
        let stdout = self
            .buildah(
                &["commit", "--quiet", container.id.as_str(), target_name.as_str()],
                |_| None,
            )
            .await?;
        let image_id = last_line(&stdout).to_string();

        let digest = self
            .buildah(
                &["inspect", "--type", "image", "--format", "{{.FromImageDigest}}", image_id.as_str()],
                |_| None,
            )
            .await
            .unwrap_or_default();
        let reference = target
            .docker_reference()
            .filter(|_| !digest.is_empty())
            .map(|name| {
                let repo = name.rsplit_once(':').map_or(name, |(repo, _)| repo);
                format!("{}@{}", repo, digest)
            });

        Ok(CommitOutput {
            image_id,
            reference,
        })
    }

    async fn push(&self, image_id: &str, destination: &ImageReference) -> LayerCacheResult<()> {
        let destination = destination.to_string();
        info!(image_id, destination = %destination, "pushing image");
        self.buildah(&["push", "--quiet", image_id, destination.as_str()], |_| None)
            .await
            .map(|_| ())
    }

    async fn delete(&self, container: &WorkingContainer) -> LayerCacheResult<()> {
        self.buildah(&["rm", container.id.as_str()], |stderr| {
            missing(stderr, CONTAINER_MISSING)
                .then(|| LayerCacheError::not_found("container", container.id.as_str()))
        })
        .await
        .map(|_| ())
    }

    async fn prune(&self) -> LayerCacheResult<()> {
        self.buildah(&["rm", "--all"], |_| None).await?;
        self.buildah(&["rmi", "--prune"], |_| None).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "buildah"
    }
}
