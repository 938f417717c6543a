//! The base chain as seen by the engine.

use tallyscan_classifier::TransactionSource;
use tallyscan_types::{Block, BlockHeader, BlockHeight, Hash};

/// Read access to an already validated base chain.
///
/// `fetch_transaction` (from [`TransactionSource`]) must find any confirmed
/// transaction, whether or not its block is still active.
pub trait ChainSource: TransactionSource + Send + Sync {
    /// Height of the active tip, or `None` for an empty chain.
    fn tip_height(&self) -> Option<BlockHeight>;

    /// Active-chain block at `height`.
    fn block_at(&self, height: BlockHeight) -> Option<Block>;

    /// Header of any known block, active or stale.
    fn header(&self, hash: &Hash) -> Option<BlockHeader>;

    /// Whether `hash` is on the active chain.
    fn is_active(&self, hash: &Hash) -> bool;

    /// Checked between blocks during a scan.
    fn shutdown_requested(&self) -> bool {
        false
    }

    /// Header of the active-chain block at `height`.
    fn header_at(&self, height: BlockHeight) -> Option<BlockHeader> {
        self.block_at(height).map(|b| b.header)
    }
}
