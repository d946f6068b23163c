use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tau_reward_types::TRAIN_REWARD_NAMESPACE;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "tau-reward",
    about = "Batch reward collection and reward metrics for rollout training",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Score training batches step by step, then the validation set.
    Run(RunArgs),
    /// Reduce a JSON object of named signal values into metrics.
    Reduce(ReduceArgs),
    /// List the registered scorer names.
    Scorers,
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    #[arg(
        long,
        env = "TAU_REWARD_CONFIG",
        help = "Reward stage config file (.toml, or .json); defaults apply when omitted"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Training samples as JSON lines")]
    pub train: PathBuf,

    #[arg(long, help = "Optional validation samples as JSON lines")]
    pub val: Option<PathBuf>,

    #[arg(
        long = "batch-size",
        default_value_t = 8,
        value_parser = parse_positive_usize,
        help = "Samples per training step"
    )]
    pub batch_size: usize,
}

#[derive(Debug, clap::Args)]
pub struct ReduceArgs {
    #[arg(long, help = "JSON object mapping signal names to value lists")]
    pub extras: String,

    #[arg(long, default_value = TRAIN_REWARD_NAMESPACE, help = "Metrics key namespace")]
    pub namespace: String,

    #[arg(long, help = "Also emit a count statistic per signal")]
    pub count: bool,
}
