//! Shared handle for concurrent readers.

use crate::{BlockOutcome, Engine, EngineError};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use tallyscan_types::{Address, Block, BlockHeader, BlockHeight, Hash, PropertyId};

/// Cloneable handle to one [`Engine`].
///
/// Queries take the shared lock. Block handling takes the exclusive lock,
/// so no two block or recovery operations interleave.
#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<RwLock<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Engine> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Engine> {
        self.inner.write()
    }

    pub fn on_block_connected(&self, block: &Block) -> Result<BlockOutcome, EngineError> {
        self.inner.write().on_block_connected(block)
    }

    pub fn on_block_disconnected(&self, header: &BlockHeader) {
        self.inner.write().on_block_disconnected(header)
    }

    pub fn balance(&self, address: &Address, property: PropertyId) -> (i64, i64) {
        self.inner.read().balance(address, property)
    }

    pub fn is_frozen(&self, address: &Address, property: PropertyId) -> bool {
        self.inner.read().is_frozen(address, property)
    }

    pub fn watermark(&self) -> Option<BlockHeight> {
        self.inner.read().watermark()
    }

    pub fn consensus_hash(&self) -> Hash {
        self.inner.read().consensus_hash()
    }
}
