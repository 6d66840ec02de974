//! Configuration management for chaincore

use crate::block_store::PendingBlockBuffer;
use crate::cache::StagedTxCache;
use crate::error::{ChainError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusConfig {
    /// Blocks this far below the tip can no longer be reorganized away.
    #[serde(default = "default_finality_depth")]
    pub finality_depth: u64,
    #[serde(default = "default_pending_block_capacity")]
    pub pending_block_capacity: usize,
    #[serde(default = "default_received_tx_capacity")]
    pub received_tx_capacity: usize,
    #[serde(default = "default_orphan_tx_capacity")]
    pub orphan_tx_capacity: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            finality_depth: default_finality_depth(),
            pending_block_capacity: default_pending_block_capacity(),
            received_tx_capacity: default_received_tx_capacity(),
            orphan_tx_capacity: default_orphan_tx_capacity(),
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.finality_depth == 0 {
            return Err(ChainError::ConfigError(
                "consensus.finality_depth must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("pending_block_capacity", self.pending_block_capacity),
            ("received_tx_capacity", self.received_tx_capacity),
            ("orphan_tx_capacity", self.orphan_tx_capacity),
        ] {
            if value == 0 {
                return Err(ChainError::ConfigError(format!(
                    "consensus.{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Loads `path`, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config: Config = if config_str.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str).map_err(|e| {
            ChainError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?
    };

    config.consensus.validate()?;
    if config.database.path.is_empty() {
        return Err(ChainError::ConfigError(
            "database.path must be set".to_string(),
        ));
    }

    Ok(config)
}

fn default_finality_depth() -> u64 {
    6
}

fn default_pending_block_capacity() -> usize {
    PendingBlockBuffer::DEFAULT_CAPACITY
}

fn default_received_tx_capacity() -> usize {
    StagedTxCache::DEFAULT_RECEIVED_CAPACITY
}

fn default_orphan_tx_capacity() -> usize {
    StagedTxCache::DEFAULT_ORPHAN_CAPACITY
}

fn default_db_path() -> String {
    "./data/chaincore.db".to_string()
}
