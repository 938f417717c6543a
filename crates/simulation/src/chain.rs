//! In-memory base chain with explicit reorgs.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tallyscan_classifier::TransactionSource;
use tallyscan_engine::ChainSource;
use tallyscan_types::{Block, BlockHeader, BlockHeight, Hash, Transaction};
use tracing::debug;

#[derive(Debug, Default)]
struct ChainData {
    /// Active chain, index = height.
    active: Vec<Block>,
    /// Every block ever connected, including disconnected ones.
    known: HashMap<Hash, BlockHeader>,
    /// Confirmed transactions by id, with their block.
    transactions: HashMap<Hash, (Transaction, Hash)>,
}

/// Deterministic chain source.
///
/// Block hashes are derived from height, parent and a caller-chosen
/// branch tag, so two chains built the same way have identical hashes.
#[derive(Debug, Default)]
pub struct SimulatedChain {
    data: RwLock<ChainData>,
    shutdown: AtomicBool,
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block holding `transactions` on top of the active tip.
    pub fn push_block(&self, branch: u64, transactions: Vec<Transaction>) -> Block {
        let mut data = self.data.write();
        let parent = data.active.last().map(|b| b.header.clone());
        let height = parent
            .as_ref()
            .map_or(BlockHeight::GENESIS, |p| p.height.next());
        let prev_hash = parent.as_ref().map_or(Hash::ZERO, |p| p.hash);

        let mut preimage = prev_hash.as_bytes().to_vec();
        preimage.extend_from_slice(&height.0.to_be_bytes());
        preimage.extend_from_slice(&branch.to_be_bytes());
        let hash = Hash::double_sha256(&preimage);

        let header = BlockHeader {
            height,
            hash,
            prev_hash,
            time: 1_500_000_000 + height.0 * 600,
            chain_tx: parent.map_or(0, |p| p.chain_tx) + transactions.len() as u64,
        };
        for tx in &transactions {
            data.transactions.insert(tx.txid, (tx.clone(), hash));
        }
        data.known.insert(hash, header.clone());

        let block = Block {
            header,
            transactions,
        };
        data.active.push(block.clone());
        block
    }

    /// Remove the active tip. Its header stays known.
    pub fn disconnect_tip(&self) -> Option<Block> {
        let block = self.data.write().active.pop()?;
        debug!(height = %block.height(), hash = %block.hash(), "Simulated disconnect");
        Some(block)
    }

    pub fn tip(&self) -> Option<BlockHeader> {
        self.data.read().active.last().map(|b| b.header.clone())
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.data.read().active.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn clear_shutdown(&self) {
        self.shutdown.store(false, Ordering::SeqCst);
    }
}

impl TransactionSource for SimulatedChain {
    fn fetch_transaction(&self, txid: &Hash) -> Option<(Transaction, Hash)> {
        self.data.read().transactions.get(txid).cloned()
    }
}

impl ChainSource for SimulatedChain {
    fn tip_height(&self) -> Option<BlockHeight> {
        self.data.read().active.last().map(|b| b.height())
    }

    fn block_at(&self, height: BlockHeight) -> Option<Block> {
        let index = usize::try_from(height.0).ok()?;
        self.data.read().active.get(index).cloned()
    }

    fn header(&self, hash: &Hash) -> Option<BlockHeader> {
        self.data.read().known.get(hash).cloned()
    }

    fn is_active(&self, hash: &Hash) -> bool {
        let data = self.data.read();
        data.known.get(hash).is_some_and(|h| {
            usize::try_from(h.height.0)
                .ok()
                .and_then(|i| data.active.get(i))
                .is_some_and(|b| b.hash() == *hash)
        })
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
