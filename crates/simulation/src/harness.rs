//! Test harness wiring a simulated chain to a real engine.

use crate::{ReferenceInterpreter, RecordingObserver, SimulatedChain, Workload};
use std::path::Path;
use std::sync::Arc;
use tallyscan_engine::{Engine, EngineConfig, EngineError, InitReport};
use tallyscan_storage::{CheckpointStore, MemoryStore};
use tallyscan_types::{Block, Transaction};
use tempfile::TempDir;

/// Chain, key-value store and checkpoint directory shared by every engine
/// the harness builds, so an engine can be dropped and rebuilt to simulate
/// a restart.
pub struct Harness {
    pub chain: Arc<SimulatedChain>,
    pub store: Arc<MemoryStore>,
    pub observer: Arc<RecordingObserver>,
    pub config: EngineConfig,
    dir: TempDir,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("tip", &self.chain.tip().map(|h| h.height))
            .field("checkpoint_dir", &self.dir.path())
            .finish_non_exhaustive()
    }
}

impl Harness {
    pub fn new(config: EngineConfig) -> std::io::Result<Self> {
        Ok(Self {
            chain: Arc::new(SimulatedChain::new()),
            store: Arc::new(MemoryStore::new()),
            observer: Arc::new(RecordingObserver::new()),
            config,
            dir: TempDir::new()?,
        })
    }

    pub fn checkpoint_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn checkpoints(&self) -> Result<CheckpointStore, tallyscan_storage::CheckpointError> {
        CheckpointStore::open(self.dir.path())
    }

    /// Build an engine over the harness state. Does not call `init`.
    pub fn engine(&self) -> Result<Engine, EngineError> {
        Ok(Engine::new(
            self.config.clone(),
            self.chain.clone(),
            self.store.clone(),
            self.checkpoints()?,
            Box::new(ReferenceInterpreter::new()),
            self.observer.clone(),
        ))
    }

    /// Build and initialize an engine.
    pub fn start(&self) -> Result<(Engine, InitReport), EngineError> {
        let mut engine = self.engine()?;
        let report = engine.init()?;
        Ok((engine, report))
    }

    /// Push every block of `workload` onto the chain without an engine.
    pub fn load(&self, workload: &Workload) {
        for txs in &workload.blocks {
            self.chain.push_block(0, txs.clone());
        }
    }

    /// Push one block and feed it to `engine`.
    pub fn connect(
        &self,
        engine: &mut Engine,
        branch: u64,
        transactions: Vec<Transaction>,
    ) -> Result<Block, EngineError> {
        let block = self.chain.push_block(branch, transactions);
        engine.on_block_connected(&block)?;
        Ok(block)
    }

    /// Disconnect `depth` blocks from the chain tip, telling `engine`
    /// about each one.
    pub fn disconnect(&self, engine: &mut Engine, depth: usize) -> Vec<Block> {
        let mut removed = Vec::with_capacity(depth);
        for _ in 0..depth {
            let Some(block) = self.chain.disconnect_tip() else {
                break;
            };
            engine.on_block_disconnected(&block.header);
            removed.push(block);
        }
        removed
    }
}
