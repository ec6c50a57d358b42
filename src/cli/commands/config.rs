//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::cli::output;
use crate::config::{Config, ConfigManager, InitOutcome};
use crate::error::LayerCacheResult;

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    manager: &ConfigManager,
    config: &Config,
) -> LayerCacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => println!("{}", toml::to_string_pretty(config)?),
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => {
            let path = manager.path().display().to_string();
            match manager.init(force).await? {
                InitOutcome::Written => output::step_ok_detail("Configuration initialized", &path),
                InitOutcome::Kept => output::step_warn_hint(
                    &format!("Config already exists at {}", path),
                    "Use --force to overwrite",
                ),
            }
        }
    }
    Ok(())
}
