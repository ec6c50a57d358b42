//! Prune command - clear leftover containers and dangling images

use super::open_cache;
use crate::cli::output;
use crate::config::Config;
use crate::error::LayerCacheResult;

/// Execute the prune command
pub async fn execute(config: &Config) -> LayerCacheResult<()> {
    let cache = open_cache(config)?;
    let result = cache.prune().await;
    cache.free();
    result?;

    output::step_ok("Cache storage pruned");
    Ok(())
}
