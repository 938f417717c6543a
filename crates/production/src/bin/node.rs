//! Tallyscan Node
//!
//! Scans a block file, maintains the tally ledger and writes checkpoints.
//! A second run restores from the newest usable checkpoint and only scans
//! blocks added since.
//!
//! # Usage
//!
//! ```bash
//! tallyscan-node --config node.toml
//!
//! # Override the block file and start from scratch
//! tallyscan-node --config node.toml --blocks ./chain.jsonl --start-clean
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [node]
//! data_dir = "./data"
//! block_file = "./chain.jsonl"
//! metrics_file = "./metrics.prom"
//!
//! [storage]
//! write_buffer_mb = 64
//! block_cache_mb = 256
//! compression = "lz4"
//!
//! [telemetry]
//! log_level = "info"
//! json = false
//!
//! [engine]
//! max_state_history = 50
//! consensus_hash_interval = 10000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tallyscan_engine::EngineConfig;
use tallyscan_production::{
    init_telemetry, metrics, CompressionType, FileChain, MetricsObserver, RocksDbConfig,
    RocksDbStore, ScanRunner, TelemetryConfig,
};
use tallyscan_simulation::ReferenceInterpreter;
use tracing::info;

/// Tallyscan Node
///
/// Maintains the tally ledger for overlay transactions in a block file.
#[derive(Parser, Debug)]
#[command(name = "tallyscan-node")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Data directory for the index and checkpoints (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Block file in JSON lines format (overrides config)
    #[arg(long)]
    blocks: Option<PathBuf>,

    /// Log level filter (overrides config; RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Wipe checkpoints and the index before scanning
    #[arg(long)]
    start_clean: bool,
}

/// Top-level node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub node: PathsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Paths for this node.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Data directory for storage
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Block file to scan
    pub block_file: PathBuf,

    /// Write the Prometheus text exposition here after the scan
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Maximum background jobs for RocksDB
    #[serde(default = "default_max_background_jobs")]
    pub max_background_jobs: i32,

    /// Write buffer size in megabytes
    #[serde(default = "default_write_buffer_mb")]
    pub write_buffer_mb: usize,

    /// Block cache size in megabytes (0 to disable)
    #[serde(default = "default_block_cache_mb")]
    pub block_cache_mb: usize,

    #[serde(default)]
    pub compression: CompressionType,

    /// fsync every index batch
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_background_jobs: default_max_background_jobs(),
            write_buffer_mb: default_write_buffer_mb(),
            block_cache_mb: default_block_cache_mb(),
            compression: CompressionType::default(),
            sync_writes: default_sync_writes(),
        }
    }
}

fn default_max_background_jobs() -> i32 {
    4
}

fn default_write_buffer_mb() -> usize {
    64
}

fn default_block_cache_mb() -> usize {
    256
}

fn default_sync_writes() -> bool {
    true
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: NodeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(data_dir) = &cli.data_dir {
            self.node.data_dir = data_dir.clone();
        }
        if let Some(blocks) = &cli.blocks {
            self.node.block_file = blocks.clone();
        }
        if let Some(level) = &cli.log_level {
            self.telemetry.log_level = level.clone();
        }
        if cli.start_clean {
            self.engine.start_clean = true;
        }
    }
}

fn build_rocksdb_config(storage: &StorageConfig) -> RocksDbConfig {
    RocksDbConfig {
        max_background_jobs: storage.max_background_jobs,
        write_buffer_size: storage.write_buffer_mb * 1024 * 1024,
        block_cache_size: if storage.block_cache_mb > 0 {
            Some(storage.block_cache_mb * 1024 * 1024)
        } else {
            None
        },
        compression: storage.compression,
        sync_writes: storage.sync_writes,
        ..RocksDbConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = NodeConfig::load(&cli.config)?;
    config.apply_overrides(&cli);

    init_telemetry(&config.telemetry).context("Failed to initialize telemetry")?;

    info!(
        config = %cli.config.display(),
        data_dir = %config.node.data_dir.display(),
        block_file = %config.node.block_file.display(),
        "Starting tallyscan node"
    );

    let index_path = config.node.data_dir.join("index");
    let store = RocksDbStore::open_with_config(&index_path, build_rocksdb_config(&config.storage))
        .with_context(|| format!("Failed to open index at {}", index_path.display()))?;

    let chain = FileChain::open(&config.node.block_file).with_context(|| {
        format!(
            "Failed to load block file {}",
            config.node.block_file.display()
        )
    })?;
    info!(blocks = chain.len(), "Block file loaded");

    let runner = ScanRunner::builder()
        .config(config.engine.clone())
        .chain(Arc::new(chain))
        .store(Arc::new(store))
        .checkpoint_dir(config.node.data_dir.join("checkpoints"))
        .interpreter(Box::new(ReferenceInterpreter::new()))
        .observer(Arc::new(MetricsObserver::new()))
        .build()
        .context("Failed to build scan runner")?;

    let summary = runner.run().await.context("Scan failed")?;

    info!(
        restored = ?summary.init.restored,
        reparse_reason = ?summary.init.reparse_reason,
        blocks = summary.init.scan.blocks,
        meta_transactions = summary.init.scan.meta_transactions,
        "Node stopped"
    );

    if let Some(path) = &config.node.metrics_file {
        let text = metrics::gather_text().context("Failed to encode metrics")?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    Ok(())
}
