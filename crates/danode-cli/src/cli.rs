use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "danode",
    about = "Data-availability operator node",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the node against an in-process chain
    Run(RunArgs),
    /// Generate a new operator signing key
    Keygen,
    /// Print a default configuration with a fresh signing key
    DefaultConfig(DefaultConfigArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the node TOML configuration
    #[arg(short, long)]
    pub config: PathBuf,
    /// Public IP reported to the socket poller
    #[arg(long, default_value = "127.0.0.1")]
    pub public_ip: String,
    /// Stake given to this operator in each configured quorum
    #[arg(long, default_value_t = 1)]
    pub stake: u64,
    /// Block stale measure reported by the local chain
    #[arg(long, default_value_t = 150)]
    pub block_stale_measure: u32,
    /// Store duration in blocks reported by the local chain
    #[arg(long, default_value_t = 20_160)]
    pub store_duration_blocks: u32,
}

#[derive(Args)]
pub struct DefaultConfigArgs {
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
