//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tallyscan_classifier::ClassifierConfig;
use tallyscan_types::{BlockHeight, Hash};

/// Externally published (block, consensus hash) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusCheckpoint {
    pub height: BlockHeight,
    pub block_hash: Hash,
    pub consensus_hash: Hash,
}

/// Configuration for the scan engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// First block that can hold overlay transactions.
    #[serde(default)]
    pub genesis_height: BlockHeight,

    /// Checkpoint retention window in blocks from the tip. Also bounds the
    /// backward search for a usable checkpoint.
    #[serde(default = "default_max_state_history")]
    pub max_state_history: u64,

    /// Seconds between scan progress reports.
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,

    /// Maximum number of cached previous outputs before the input cache is
    /// flushed.
    #[serde(default = "default_input_cache_capacity")]
    pub input_cache_capacity: usize,

    /// Keep running after a failed external checkpoint or freeze replay.
    #[serde(default)]
    pub override_forced_shutdown: bool,

    /// Wipe checkpoint files and the index on startup.
    #[serde(default)]
    pub start_clean: bool,

    /// Log the consensus hash every N blocks (0 = never).
    #[serde(default)]
    pub consensus_hash_interval: u64,

    /// Log the consensus hash after every valid transaction.
    #[serde(default)]
    pub consensus_hash_every_transaction: bool,

    #[serde(default)]
    pub checkpoints: Vec<ConsensusCheckpoint>,

    #[serde(default)]
    pub classifier: ClassifierConfig,
}

fn default_max_state_history() -> u64 {
    50
}

fn default_progress_interval_secs() -> u64 {
    30
}

fn default_input_cache_capacity() -> usize {
    500_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            genesis_height: BlockHeight::GENESIS,
            max_state_history: default_max_state_history(),
            progress_interval_secs: default_progress_interval_secs(),
            input_cache_capacity: default_input_cache_capacity(),
            override_forced_shutdown: false,
            start_clean: false,
            consensus_hash_interval: 0,
            consensus_hash_every_transaction: false,
            checkpoints: Vec::new(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    /// Published checkpoint at `height`, if any.
    pub fn checkpoint_at(&self, height: BlockHeight) -> Option<&ConsensusCheckpoint> {
        self.checkpoints.iter().find(|c| c.height == height)
    }

    pub fn should_hash_block(&self, height: BlockHeight) -> bool {
        self.consensus_hash_interval > 0 && height.0 % self.consensus_hash_interval == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_state_history, 50);
        assert_eq!(config.progress_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_checkpoints_from_toml() {
        let hash = "ab".repeat(32);
        let config: EngineConfig = toml::from_str(&format!(
            r#"
            genesis_height = 100
            consensus_hash_interval = 10

            [[checkpoints]]
            height = 120
            block_hash = "{hash}"
            consensus_hash = "{hash}"

            [classifier]
            magic = "tally"
            "#
        ))
        .unwrap();

        assert_eq!(config.genesis_height, BlockHeight(100));
        assert_eq!(config.classifier.magic, "tally");
        assert!(config.checkpoint_at(BlockHeight(120)).is_some());
        assert!(config.checkpoint_at(BlockHeight(121)).is_none());
        assert!(config.should_hash_block(BlockHeight(130)));
        assert!(!config.should_hash_block(BlockHeight(131)));
    }
}
