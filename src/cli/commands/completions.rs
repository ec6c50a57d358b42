//! Completions command - print shell completion scripts

use crate::cli::args::{Cli, CompletionsArgs};
use crate::error::LayerCacheResult;
use clap::CommandFactory;

/// Execute the completions command
pub fn execute(args: CompletionsArgs) -> LayerCacheResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(args.shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
