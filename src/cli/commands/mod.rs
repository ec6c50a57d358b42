//! CLI command implementations

pub mod completions;
pub mod config;
pub mod mount;
pub mod prune;
pub mod unmount;

pub use completions::execute as completions;
pub use config::execute as config;
pub use mount::execute as mount;
pub use prune::execute as prune;
pub use unmount::execute as unmount;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::LayerCacheResult;
use crate::storage::create_store;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Build the cache store for the configured container storage
fn open_cache(config: &Config) -> LayerCacheResult<CacheStore> {
    Ok(CacheStore::new(create_store(&config.storage)?))
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, leaving working container in place");
            child.cancel();
        }
    });
    token
}
