//! Cache lifecycle: mount, release and commit of cache entries
//!
//! `mount` resolves the entry's image, creates a working container (empty
//! when the entry was never committed) and mounts it, optionally bound onto
//! an external directory. `unmount` finds the container again, by name or by
//! the bind directory recorded in its metadata, releases every mount and
//! commits a new image revision only when the content changed.

use crate::cache::acquire::acquire;
use crate::cache::bind::{bind_container, create_mount_dir, unbind_and_remove, BindMount, SysBindMount};
use crate::cache::commit::commit_changes;
use crate::cache::image::{cache_reference, resolve_source, ImageReference, ResolvedImage};
use crate::cache::options::{MountOptions, MOUNT_DIR_ARG};
use crate::cache::rollback::{Rollback, RollbackStep};
use crate::error::{LayerCacheError, LayerCacheResult};
use crate::storage::{ContainerStore, WorkingContainer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, field, info, info_span, warn, Instrument, Span};

/// Result of releasing a cache entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnmountOutcome {
    /// Image holding the entry's content; `None` when nothing was committed
    pub image_id: Option<String>,
    /// Whether a new image revision was created
    pub new_image: bool,
}

/// Destination of a committed revision, resolved before anything is torn down
#[derive(Debug)]
struct CommitTarget {
    cache: ImageReference,
    push_to: Option<ImageReference>,
}

impl CommitTarget {
    fn resolve(opts: &MountOptions) -> LayerCacheResult<Option<Self>> {
        if !opts.commit {
            return Ok(None);
        }
        Ok(Some(Self {
            cache: cache_reference(opts)?,
            push_to: opts.image().map(ImageReference::parse).transpose()?,
        }))
    }
}

/// Cache store backed by a container storage service
pub struct CacheStore {
    store: Box<dyn ContainerStore>,
    mounter: Box<dyn BindMount>,
}

impl CacheStore {
    /// Create a cache store binding external directories with mount(2)
    pub fn new(store: Box<dyn ContainerStore>) -> Self {
        Self::with_bind_mount(store, Box::new(SysBindMount))
    }

    pub fn with_bind_mount(store: Box<dyn ContainerStore>, mounter: Box<dyn BindMount>) -> Self {
        Self { store, mounter }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Release the underlying storage handle
    pub fn free(self) {
        self.store.free();
    }

    /// Remove leftover containers and dangling images from the storage
    pub async fn prune(&self) -> LayerCacheResult<()> {
        info!(backend = self.store.backend_name(), "pruning cache storage");
        self.store.prune().await
    }

    /// Mount a cache entry and return the writable directory.
    ///
    /// The directory is `mount_dir` when one was requested, otherwise the
    /// container's own mount point. On failure everything set up so far is
    /// torn down again before the error is returned.
    pub async fn mount(&self, opts: &MountOptions) -> LayerCacheResult<PathBuf> {
        opts.validate()?;
        let name = opts.container_name()?;
        let image = resolve_source(opts)?;

        let span = info_span!(
            "mount",
            image = %image.name(),
            container = %name,
            image_id = field::Empty,
        );
        async {
            let mut rollback = Rollback::new();
            match self.mount_steps(opts, &name, &image, &mut rollback).await {
                Ok(dir) => {
                    rollback.disarm();
                    Ok(dir)
                }
                Err(e) => {
                    rollback
                        .unwind(self.store.as_ref(), self.mounter.as_ref())
                        .await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn mount_steps(
        &self,
        opts: &MountOptions,
        name: &str,
        image: &ResolvedImage,
        rollback: &mut Rollback,
    ) -> LayerCacheResult<PathBuf> {
        if let Some(dir) = opts.mount_dir() {
            create_mount_dir(dir).await?;
            rollback.push(RollbackStep::RemoveDir(dir.to_path_buf()));
        }

        let mut container = acquire(self.store.as_ref(), name, image).await?;
        rollback.push(RollbackStep::DeleteContainer(container.clone()));
        if let Some(id) = &container.from_image_id {
            Span::current().record("image_id", id.as_str());
        }

        bind_container(
            self.store.as_ref(),
            self.mounter.as_ref(),
            &mut container,
            opts,
            rollback,
        )
        .await
    }

    /// Release a mounted cache entry, committing it when requested.
    ///
    /// The container is found by name, or through the bind directory its
    /// metadata records. It is deleted afterwards unless the request was
    /// cancelled in the meantime.
    pub async fn unmount(&self, opts: &MountOptions) -> LayerCacheResult<UnmountOutcome> {
        opts.validate()?;
        if opts.explicit_container_name().is_none() && opts.mount_dir().is_none() {
            return Err(LayerCacheError::invalid_request(
                "neither container name nor mount path provided",
            ));
        }
        let name = opts.container_name()?;
        let target = CommitTarget::resolve(opts)?;

        let span = info_span!("unmount", container = %name, image_id = field::Empty);
        async {
            let mut first_err = None;
            if let Some(dir) = opts.mount_dir() {
                if let Err(e) = unbind_and_remove(self.mounter.as_ref(), dir).await {
                    first_err = Some(e);
                }
            }

            let container = match self.locate(opts, &name).await {
                Ok(container) => container,
                Err(e) => return Err(first_err.unwrap_or(e)),
            };

            if let Some(recorded) = container.arg(MOUNT_DIR_ARG) {
                let recorded = Path::new(recorded);
                if opts.mount_dir() != Some(recorded) {
                    if let Err(e) = unbind_and_remove(self.mounter.as_ref(), recorded).await {
                        first_err.get_or_insert(e);
                    }
                }
            }

            let result = self.release(&container, target.as_ref(), first_err).await;
            if let Ok(UnmountOutcome {
                image_id: Some(id), ..
            }) = &result
            {
                Span::current().record("image_id", id.as_str());
            }
            self.delete(opts, &container, result).await
        }
        .instrument(span)
        .await
    }

    async fn locate(&self, opts: &MountOptions, name: &str) -> LayerCacheResult<WorkingContainer> {
        let by_name = if name.is_empty() {
            Err(LayerCacheError::not_found("container", name))
        } else {
            self.store.open(name).await
        };

        match by_name {
            Ok(container) => Ok(container),
            Err(e) if e.is_not_found() && opts.explicit_container_name().is_none() => {
                let Some(dir) = opts.mount_dir() else {
                    return Err(e);
                };
                debug!(dir = %dir.display(), "looking up cache container by mount path");
                self.store.open_by_path(dir).await
            }
            Err(e) => Err(e),
        }
    }

    async fn release(
        &self,
        container: &WorkingContainer,
        target: Option<&CommitTarget>,
        first_err: Option<LayerCacheError>,
    ) -> LayerCacheResult<UnmountOutcome> {
        let unmounted = self.store.unmount(container).await;
        if let Some(e) = first_err {
            if let Err(unmount_err) = unmounted {
                warn!(error = %unmount_err, "failed to unmount cache container");
            }
            return Err(e);
        }
        unmounted?;

        let Some(target) = target else {
            return Ok(UnmountOutcome::default());
        };

        let committed = commit_changes(self.store.as_ref(), container, &target.cache).await?;
        if committed.new_image {
            if let Some(destination) = &target.push_to {
                info!(image_id = %committed.image_id, destination = %destination, "pushing cache image");
                self.store
                    .push(&committed.image_id, destination)
                    .await
                    .map_err(|e| LayerCacheError::PushFailed {
                        image_id: committed.image_id.clone(),
                        destination: destination.to_string(),
                        source: Box::new(e),
                    })?;
            }
        }

        Ok(UnmountOutcome {
            image_id: Some(committed.image_id),
            new_image: committed.new_image,
        })
    }

    /// Delete the working container; an earlier error takes precedence
    async fn delete(
        &self,
        opts: &MountOptions,
        container: &WorkingContainer,
        result: LayerCacheResult<UnmountOutcome>,
    ) -> LayerCacheResult<UnmountOutcome> {
        if opts.cancel.is_cancelled() {
            warn!(container = %container.short_id(), "cancelled, keeping container");
            return result;
        }

        debug!(container = %container.short_id(), "deleting container");
        match (self.store.delete(container).await, result) {
            (Ok(()), result) => result,
            (Err(e), Ok(_)) => Err(LayerCacheError::cleanup(
                format!("delete container {}", container.name),
                e,
            )),
            (Err(e), Err(original)) => {
                warn!(error = %e, "failed to delete cache container");
                Err(original)
            }
        }
    }
}
