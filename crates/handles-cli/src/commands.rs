use std::fs;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use handles_attorney::State;
use handles_pipeline::{spawn_listener, HandlesBlock, Incorporator, IncorporatorConfig};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::cli::*;
use crate::config::NodeConfig;
use crate::replay::{end_seal, feed, load_events};

const EVENT_QUEUE: usize = 64;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Genesis(args) => cmd_genesis(args),
        Command::CheckConfig(args) => cmd_check_config(args),
        Command::Inspect(args) => cmd_inspect(args),
        Command::Replay(args) => cmd_replay(args),
    }
}

fn optional_config(path: Option<&Path>) -> anyhow::Result<NodeConfig> {
    match path {
        Some(path) => Ok(NodeConfig::load_checked(path)?),
        None => Ok(NodeConfig::default()),
    }
}

fn print_summary(state: &State) {
    println!("  Members:   {}", state.members().len().to_string().bold());
    println!("  Captions:  {}", state.captions().len().to_string().bold());
    println!("  Attorneys: {}", state.attorneys().len().to_string().bold());
    println!("  Checksum:  {}", state.checksum().to_hex().cyan());
}

fn cmd_genesis(args: GenesisArgs) -> anyhow::Result<()> {
    let config = optional_config(args.config.as_deref())?;
    let data = args.data.or(config.notary_path);
    let state = match &data {
        Some(dir) => State::genesis(dir)
            .with_context(|| format!("cannot create genesis state in {}", dir.display()))?,
        None => State::genesis_memory(),
    };
    let hash = state.genesis_hash(config.node_protocol, config.parent_protocol);

    println!("{} Genesis state created", "✓".green().bold());
    match &data {
        Some(dir) => println!("  Data:      {}", dir.display().to_string().bold()),
        None => println!("  Data:      {}", "memory".dimmed()),
    }
    print_summary(&state);
    println!("  Genesis:   {}", hash.to_hex().yellow());
    state.close()?;
    Ok(())
}

fn cmd_check_config(args: CheckConfigArgs) -> anyhow::Result<()> {
    match NodeConfig::load_checked(&args.file) {
        Ok(config) => {
            println!("{} {} is valid", "✓".green().bold(), args.file.display());
            println!("  Node:      {}", config.node_token()?.short_id().cyan());
            println!("  Genesis:   {}", config.genesis);
            println!("  Providers: {}/{}", config.providers_size, config.trusted_providers.len());
            Ok(())
        }
        Err(e) => {
            println!("{} {}: {}", "✗".red().bold(), args.file.display(), e);
            Err(e.into())
        }
    }
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let bytes = fs::read(&args.state)
        .with_context(|| format!("cannot read {}", args.state.display()))?;
    let state = State::from_bytes(&bytes, args.data.as_deref())
        .with_context(|| format!("cannot load {}", args.state.display()))?;
    println!("State {}", args.state.display().to_string().bold());
    print_summary(&state);
    state.close()?;
    Ok(())
}

fn cmd_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let config = optional_config(args.config.as_deref())?;
    let events = load_events(&args.events)?;
    let data = args.data.or(config.notary_path);
    let state = match &data {
        Some(dir) => State::open(dir)
            .with_context(|| format!("cannot open state in {}", dir.display()))?,
        None => State::genesis_memory(),
    };
    let incorporator_config = IncorporatorConfig {
        checkpoint_interval: config.keep_n_blocks,
        checkpoint_dir: data.as_ref().map(|dir| dir.join("checkpoints")),
    };
    info!(events = events.len(), "replaying events");

    let runtime = tokio::runtime::Runtime::new()?;
    let state = runtime.block_on(async move {
        let (block_tx, block_rx) = mpsc::channel(EVENT_QUEUE);
        let (commit_tx, commit_rx) = mpsc::channel(EVENT_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let output = spawn_listener(block_rx, commit_rx, shutdown_rx);
        let feeder = tokio::spawn(feed(events, block_tx, commit_tx));

        let incorporator = Incorporator::new(state, incorporator_config);
        let state = report_blocks(incorporator, output).await?;
        // stopping the listener releases the feeder
        shutdown_tx.send_replace(true);
        feeder.await?;
        anyhow::Ok(state)
    })?;

    println!("{} Replay complete", "✓".green().bold());
    print_summary(&state);
    state.close()?;
    Ok(())
}

async fn report_blocks(
    mut incorporator: Incorporator,
    mut output: mpsc::Receiver<HandlesBlock>,
) -> anyhow::Result<State> {
    let end = end_seal();
    while let Some(block) = output.recv().await {
        if block.seal == end {
            break;
        }
        let report = incorporator.apply_block(&block)?;
        println!(
            "  epoch {:>6}  {} accepted  {} rejected  {}",
            report.epoch,
            report.accepted.to_string().green(),
            report.rejected.to_string().red(),
            report.checksum.short_hex().dimmed()
        );
        if incorporator.checkpoint_due(report.epoch) {
            incorporator.checkpoint(report.epoch).await?;
        }
    }
    Ok(incorporator.finish().await?)
}
