//! Configuration management for the ledger core

use crate::error::{ChainError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// One whole coin expressed in base units.
pub const COIN: u64 = 100_000_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub mempool: MempoolConfig,
    pub consensus: ConsensusConfig,
    pub genesis: GenesisConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    pub max_size: usize,
    pub max_per_sender: usize,
    pub tx_ttl_secs: u64,
    pub orphan_ttl_secs: u64,
    pub max_orphans: usize,
    /// Invalid submissions inside `ban_window_secs` that trigger a ban.
    pub ban_threshold: u32,
    pub ban_window_secs: u64,
    pub ban_duration_secs: u64,
    pub seen_cache_size: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: 5000,
            max_per_sender: 25,
            tx_ttl_secs: 3600,
            orphan_ttl_secs: 600,
            max_orphans: 1000,
            ban_threshold: 3,
            ban_window_secs: 60,
            ban_duration_secs: 300,
            seen_cache_size: 100_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Difficulty is counted in leading zero bits of the block hash.
    pub initial_difficulty: u32,
    pub min_difficulty: u32,
    pub max_difficulty: u32,
    pub retarget_interval: u64,
    pub target_block_time_secs: u64,
    pub max_retarget_factor: f64,
    pub initial_reward: u64,
    pub halving_interval: u64,
    pub max_supply: u64,
    pub max_future_drift_secs: u64,
    pub max_block_transactions: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            initial_difficulty: 8,
            min_difficulty: 1,
            max_difficulty: 255,
            retarget_interval: 10,
            target_block_time_secs: 30,
            max_retarget_factor: 4.0,
            initial_reward: 50 * COIN,
            halving_interval: 210_000,
            max_supply: 21_000_000 * COIN,
            max_future_drift_secs: 7200,
            max_block_transactions: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    pub reward: u64,
    pub timestamp_ms: u64,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            reward: 1_000_000,
            timestamp_ms: 1_672_531_200_000,
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: LedgerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate critical values
    pub fn validate(&self) -> Result<()> {
        let mempool = &self.mempool;
        if mempool.max_size == 0 {
            return Err(ChainError::Config("mempool.max_size must be greater than zero".to_string()));
        }
        if mempool.max_per_sender == 0 {
            return Err(ChainError::Config(
                "mempool.max_per_sender must be greater than zero".to_string(),
            ));
        }
        if mempool.ban_threshold == 0 {
            return Err(ChainError::Config(
                "mempool.ban_threshold must be greater than zero".to_string(),
            ));
        }

        let consensus = &self.consensus;
        if consensus.retarget_interval == 0 || consensus.halving_interval == 0 {
            return Err(ChainError::Config(
                "consensus.retarget_interval and consensus.halving_interval must be non-zero".to_string(),
            ));
        }
        if consensus.max_retarget_factor < 1.0 {
            return Err(ChainError::Config(format!(
                "consensus.max_retarget_factor must be >= 1.0, got {}",
                consensus.max_retarget_factor
            )));
        }
        if consensus.min_difficulty > consensus.max_difficulty
            || consensus.initial_difficulty < consensus.min_difficulty
            || consensus.initial_difficulty > consensus.max_difficulty
        {
            return Err(ChainError::Config(format!(
                "consensus.initial_difficulty {} must lie within [{}, {}]",
                consensus.initial_difficulty, consensus.min_difficulty, consensus.max_difficulty
            )));
        }
        if self.genesis.reward > consensus.max_supply {
            return Err(ChainError::Config("genesis.reward exceeds consensus.max_supply".to_string()));
        }
        Ok(())
    }
}

/// Loads configuration from `path`, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<LedgerConfig> {
    let path = path.as_ref();
    if !path.exists() {
        let config = LedgerConfig::default();
        config.validate()?;
        return Ok(config);
    }
    let source = fs::read_to_string(path)?;
    LedgerConfig::from_toml_str(&source)
}
