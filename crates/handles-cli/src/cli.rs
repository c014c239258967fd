use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "handles",
    about = "Handles ledger: members, captions, and powers of attorney",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty ledger state and print its genesis hash
    Genesis(GenesisArgs),
    /// Validate a node configuration file
    CheckConfig(CheckConfigArgs),
    /// Summarize a serialized state or checkpoint
    Inspect(InspectArgs),
    /// Feed recorded block and commit events through the pipeline
    Replay(ReplayArgs),
}

#[derive(Args)]
pub struct GenesisArgs {
    /// Directory for the durable vault journals (memory-only when absent)
    #[arg(long)]
    pub data: Option<PathBuf>,
    /// Node configuration supplying the protocol codes
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct CheckConfigArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Serialized state (e.g. `checkpoint-900.state`)
    pub state: PathBuf,
    /// Load into durable journals under this directory instead of memory
    #[arg(long)]
    pub data: Option<PathBuf>,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// JSON-lines file of block and commit events
    pub events: PathBuf,
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory for the durable vault journals and checkpoints
    #[arg(long)]
    pub data: Option<PathBuf>,
}
