//! Working container acquisition with scratch fallback

use crate::cache::image::{ResolvedImage, SCRATCH};
use crate::error::{LayerCacheError, LayerCacheResult};
use crate::storage::{BuilderOptions, ContainerStore, PullPolicy, WorkingContainer};
use tracing::{info, warn};

/// Create the working container for a cache entry.
///
/// A cache that was never committed has no image yet: when the store reports
/// the base image as not found, the container starts from an empty file
/// system instead. Any other failure is fatal.
pub async fn acquire(
    store: &dyn ContainerStore,
    name: &str,
    image: &ResolvedImage,
) -> LayerCacheResult<WorkingContainer> {
    let image_name = image.name();
    let options = BuilderOptions::cache_container(name, image_name.as_str(), image.pull_policy);

    match store.create(&options).await {
        Ok(container) => Ok(container),
        Err(e) if e.is_not_found() && image_name != SCRATCH => {
            warn!(image = %image_name, error = %e, "cache image unavailable");
            info!(image = %image_name, "creating empty cache since image does not exist");
            let scratch = BuilderOptions::cache_container(name, SCRATCH, PullPolicy::Never);
            store
                .create(&scratch)
                .await
                .map_err(|e| acquisition_failed(SCRATCH, e))
        }
        Err(e) => Err(acquisition_failed(&image_name, e)),
    }
}

fn acquisition_failed(image: &str, source: LayerCacheError) -> LayerCacheError {
    LayerCacheError::AcquisitionFailed {
        image: image.to_string(),
        source: Box::new(source),
    }
}
