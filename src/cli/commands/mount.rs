//! Mount command - make a cache entry writable

use super::{cancel_on_interrupt, open_cache};
use crate::cli::args::MountArgs;
use crate::config::Config;
use crate::error::LayerCacheResult;
use tracing::debug;

/// Execute the mount command
///
/// Prints the writable cache directory on stdout.
pub async fn execute(args: MountArgs, config: &Config) -> LayerCacheResult<()> {
    let opts = args
        .target
        .to_options(config)
        .with_cancel(cancel_on_interrupt());
    opts.validate()?;

    let cache = open_cache(config)?;
    debug!(backend = cache.backend_name(), "opened cache storage");

    let result = cache.mount(&opts).await;
    cache.free();

    let dir = result?;
    println!("{}", dir.display());
    Ok(())
}
