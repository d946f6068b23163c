mod bootstrap_helpers;
mod cli_args;
mod commands;

use anyhow::Result;
use clap::Parser;
use tau_reward_scoring::ScorerRegistry;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::{Cli, Commands};
use crate::commands::{execute_reduce, execute_run, execute_scorers};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let registry = ScorerRegistry::with_builtins();
    match cli.command {
        Commands::Run(args) => execute_run(args, &registry).await,
        Commands::Reduce(args) => execute_reduce(args),
        Commands::Scorers => {
            execute_scorers(&registry);
            Ok(())
        }
    }
}
