//! Change-aware commits of released cache containers

use crate::cache::image::ImageReference;
use crate::error::{LayerCacheError, LayerCacheResult};
use crate::storage::{ContainerStore, WorkingContainer};
use tracing::{debug, info};

/// Outcome of releasing a container with commit requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub image_id: String,
    /// Canonical reference of a newly created image
    pub reference: Option<String>,
    /// False when the base image was reused because nothing changed
    pub new_image: bool,
}

/// Commit `container` to `target` unless its top layer is unchanged.
///
/// An untouched container built on an existing image reports that image
/// instead of creating an identical revision. A container started from
/// scratch is always committed, even when empty, so the cache entry exists
/// afterwards.
pub async fn commit_changes(
    store: &dyn ContainerStore,
    container: &WorkingContainer,
    target: &ImageReference,
) -> LayerCacheResult<CommitResult> {
    let image = target.base_image_name();
    let changes = store.changes(container).await?;

    if changes.is_empty() {
        if let Some(base) = &container.from_image_id {
            info!(
                image = %image,
                container = %container.short_id(),
                volume = %container.name,
                "skipping commit since nothing changed"
            );
            return Ok(CommitResult {
                image_id: base.clone(),
                reference: None,
                new_image: false,
            });
        }
    }

    for change in &changes {
        debug!(image = %image, path = %change.path, kind = %change.kind, "path changed");
    }

    let output = store
        .commit(container, target)
        .await
        .map_err(|e| LayerCacheError::CommitFailed {
            image: image.clone(),
            source: Box::new(e),
        })?;

    info!(
        image = %image,
        container = %container.short_id(),
        image_id = %output.image_id,
        changes = changes.len(),
        "{}",
        if changes.is_empty() {
            "created new empty image"
        } else {
            "created new image from volume"
        }
    );

    Ok(CommitResult {
        image_id: output.image_id,
        reference: output.reference,
        new_image: true,
    })
}
