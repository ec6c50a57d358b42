//! CLI argument definitions using clap derive

use crate::cache::MountOptions;
use crate::config::Config;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// layercache - Filesystem caches persisted as OCI images
///
/// Mounts named cache directories backed by container images and commits
/// them back into new image revisions when their content changed.
#[derive(Parser, Debug)]
#[command(name = "layercache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LAYERCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format (overrides general.log_format)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mount a cache entry and print its directory
    Mount(MountArgs),

    /// Release a mounted cache entry, optionally committing it
    Unmount(UnmountArgs),

    /// Remove leftover cache containers and dangling images
    Prune,

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Options addressing a cache entry
#[derive(Args, Debug, Clone)]
pub struct CacheTarget {
    /// Cache entry name
    #[arg(short = 'n', long)]
    pub cache_name: Option<String>,

    /// Cache namespace (default: cache.namespace from config)
    #[arg(long)]
    pub namespace: Option<String>,

    /// External image to seed from and push to (e.g. docker://quay.io/org/cache:main)
    #[arg(short, long)]
    pub image: Option<String>,

    /// Working container name
    #[arg(long)]
    pub container: Option<String>,

    /// Absolute directory to bind the cache onto
    #[arg(short, long)]
    pub dir: Option<PathBuf>,
}

impl CacheTarget {
    /// Build a mount request, filling the namespace from config
    pub fn to_options(&self, config: &Config) -> MountOptions {
        let namespace = self
            .namespace
            .clone()
            .or_else(|| Some(config.cache.namespace.clone()));
        MountOptions {
            image: self.image.clone(),
            container_name: self.container.clone(),
            mount_dir: self.dir.clone(),
            cache_name: self.cache_name.clone(),
            cache_namespace: namespace,
            ..MountOptions::default()
        }
    }
}

/// Arguments for the mount command
#[derive(Parser, Debug)]
pub struct MountArgs {
    #[command(flatten)]
    pub target: CacheTarget,
}

/// Arguments for the unmount command
#[derive(Parser, Debug)]
pub struct UnmountArgs {
    #[command(flatten)]
    pub target: CacheTarget,

    /// Commit changes into a new image revision
    #[arg(long)]
    pub commit: bool,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Simple text
    Plain,
    /// JSON output
    Json,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
