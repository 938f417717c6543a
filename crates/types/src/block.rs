//! Blocks of the base chain.

use crate::{BlockHeight, Hash, Transaction};
use serde::{Deserialize, Serialize};

/// Header fields the engine needs from a base-chain block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: BlockHeight,
    pub hash: Hash,
    pub prev_hash: Hash,
    /// Block timestamp (seconds since epoch).
    pub time: u64,
    /// Cumulative number of transactions in the chain up to and including
    /// this block. Drives scan progress estimation.
    pub chain_tx: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn height(&self) -> BlockHeight {
        self.header.height
    }

    pub fn hash(&self) -> Hash {
        self.header.hash
    }
}
