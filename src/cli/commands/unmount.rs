//! Unmount command - release a cache entry and optionally commit it

use super::{cancel_on_interrupt, open_cache};
use crate::cache::UnmountOutcome;
use crate::cli::args::{OutputFormat, UnmountArgs};
use crate::cli::output;
use crate::config::Config;
use crate::error::LayerCacheResult;

/// Execute the unmount command
pub async fn execute(args: UnmountArgs, config: &Config) -> LayerCacheResult<()> {
    let opts = args
        .target
        .to_options(config)
        .with_commit(args.commit)
        .with_cancel(cancel_on_interrupt());
    opts.validate()?;

    let cache = open_cache(config)?;
    let result = cache.unmount(&opts).await;
    cache.free();
    let outcome = result?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Plain => print_plain(&outcome),
    }
    Ok(())
}

fn print_plain(outcome: &UnmountOutcome) {
    match (&outcome.image_id, outcome.new_image) {
        (Some(id), true) => {
            output::step_ok_detail("Committed new cache revision", short_id(id));
            println!("{}", id);
        }
        (Some(id), false) => {
            output::step_ok_detail("Cache unchanged", short_id(id));
            println!("{}", id);
        }
        (None, _) => output::step_ok("Cache released without commit"),
    }
}

fn short_id(id: &str) -> &str {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    &id[..id.len().min(12)]
}
