//! Node configuration: the seven options enumerated for the node, loaded
//! from a TOML file with programmatic defaults as fallback. No global
//! mutable config -- a `NodeConfig` value is constructed once and passed
//! by reference into the node core and its components.

use chain_core::ChainParams;
use serde::{Deserialize, Serialize};
use shared::{Amount, ChainError, Result};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    pub max_size: usize,
    pub expiration_time_ms: i64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: 5_000,
            expiration_time_ms: 24 * 60 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub target_block_time_ms: i64,
    pub max_block_size: usize,
    pub blocks_before_adjustment: usize,
    pub halving_interval: u64,
    pub max_supply: Amount,
    pub mempool: MempoolConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            target_block_time_ms: 10_000,
            max_block_size: 200_000,
            blocks_before_adjustment: 30,
            halving_interval: 262_980,
            max_supply: 27_000_000_000_000,
            mempool: MempoolConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Loads a config from a TOML file, falling back to defaults for any
    /// field the file omits.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or doesn't parse as
    /// valid TOML matching this shape.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ChainError::IoError(e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ChainError::SerializationError(e.to_string()))
    }

    #[must_use]
    pub fn chain_params(&self) -> ChainParams {
        ChainParams {
            target_block_time_ms: self.target_block_time_ms,
            max_block_size: self.max_block_size,
            blocks_before_adjustment: self.blocks_before_adjustment,
            halving_interval: self.halving_interval,
            max_supply: self.max_supply,
            initial_difficulty: 1,
        }
    }
}
