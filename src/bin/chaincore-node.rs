#![forbid(unsafe_code)]
//! Replays blocks from a JSON file through the consensus manager and persists
//! whatever becomes final.

use chaincore::blockchain::{short_hash, Block, StructuralValidator};
use chaincore::config::load_config;
use chaincore::consensus::{BlockOutcome, ConsensusManager};
use chaincore::ledger::BalanceLedger;
use chaincore::persistence::{Database, HeightSource, InMemoryPersistence};
use chaincore::sync::ChannelRequester;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, default_value = "chaincore.toml")]
    config: PathBuf,

    /// JSON array of blocks to ingest, in arrival order
    #[arg(long)]
    blocks: PathBuf,

    /// Override the persisted height before ingesting
    #[arg(long)]
    stored_height: Option<u64>,

    /// Peer to name as the source of every block
    #[arg(long)]
    peer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let heights: Arc<dyn HeightSource> = match Database::open(&config.database.path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            warn!(
                "Failed to open DB at {}: {}. Falling back to in-memory persistence.",
                config.database.path, e
            );
            Arc::new(InMemoryPersistence::new())
        }
    };

    let (requester, mut requests) = ChannelRequester::new();
    let request_log = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(request) = requests.recv().await {
            count += 1;
            info!(
                "Parent {} requested (hint: {})",
                short_hash(&request.wanted),
                request.hint_peer.as_deref().unwrap_or("none")
            );
        }
        count
    });

    let manager = ConsensusManager::new(
        config.consensus.clone(),
        Arc::new(StructuralValidator),
        Arc::new(BalanceLedger::new()),
        heights.clone(),
        Arc::new(requester),
    )?;
    if let Some(height) = cli.stored_height {
        manager.set_stored_height(height);
    }

    let raw = std::fs::read_to_string(&cli.blocks)
        .map_err(|e| format!("Failed to read {}: {}", cli.blocks.display(), e))?;
    let blocks: Vec<Block> = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse {}: {}", cli.blocks.display(), e))?;
    info!("Replaying {} blocks from {}", blocks.len(), cli.blocks.display());

    let mut rejected = 0usize;
    for block in blocks {
        let height = block.height();
        let hash = block.hash();
        let outcome = manager.submit_block(block, true, cli.peer.as_deref());
        match &outcome {
            BlockOutcome::Invalid(reason) | BlockOutcome::Malformed(reason) => {
                rejected += 1;
                warn!("Block {} at height {} rejected: {}", short_hash(&hash), height, reason);
            }
            other => info!("Block {} at height {}: {:?}", short_hash(&hash), height, other),
        }

        for finalized in manager.take_finalized() {
            heights.record_height(finalized.height(), finalized.hash())?;
            info!("Finalized block {} at height {}", short_hash(&finalized.hash()), finalized.height());
        }
    }

    if let Some(tip) = manager.get_highest_block() {
        println!("tip: {} at height {}", hex::encode(tip.hash()), tip.height());
    }
    println!("{}", serde_json::to_string_pretty(&manager.stats())?);
    if rejected > 0 {
        println!("rejected: {}", rejected);
    }

    drop(manager);
    let requested = request_log.await?;
    info!("{} parent requests issued", requested);
    Ok(())
}
