//! layercache - Filesystem caches persisted as OCI images
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use layercache::cli::args::LogFormat;
use layercache::cli::{Cli, Commands};
use layercache::config::ConfigManager;
use layercache::error::LayerCacheResult;
use std::error::Error as _;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  {} {}", style("Caused by:").dim(), cause);
                source = cause.source();
            }
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> LayerCacheResult<()> {
    let cli = Cli::parse();

    // Completions need neither logging nor config
    if let Commands::Completions(args) = cli.command {
        return layercache::cli::commands::completions(args);
    }

    let config_manager = ConfigManager::resolve(cli.config.clone());
    let config = config_manager.load().await?;

    let format = cli.log_format.unwrap_or(match config.general.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(cli.verbose, format);
    debug!("Loaded config from {}", config_manager.path().display());

    match cli.command {
        Commands::Completions(_) => unreachable!("Completions handled above"),
        Commands::Mount(args) => layercache::cli::commands::mount(args, &config).await,
        Commands::Unmount(args) => layercache::cli::commands::unmount(args, &config).await,
        Commands::Prune => layercache::cli::commands::prune(&config).await,
        Commands::Config(args) => {
            layercache::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; RUST_LOG takes precedence when set
fn init_logging(verbose: u8, format: LogFormat) {
    let default = match verbose {
        0 => "layercache=warn",
        1 => "layercache=info",
        _ => "layercache=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.without_time().init(),
        LogFormat::Json => builder.json().init(),
    }
}
