//! Cache of previous outputs spent by classified transactions.

use crate::Rejection;
use std::collections::HashMap;
use tallyscan_types::{Hash, OutPoint, Transaction, TxOut};
use tracing::{debug, trace};

/// Lookup of confirmed transactions by id.
pub trait TransactionSource {
    /// Fetch a confirmed transaction together with the hash of the block
    /// that contains it.
    fn fetch_transaction(&self, txid: &Hash) -> Option<(Transaction, Hash)>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Bounded map from outpoint to the output it refers to.
///
/// When the map grows past its capacity it is flushed wholesale before the
/// next fill.
#[derive(Debug)]
pub struct InputCache {
    coins: HashMap<OutPoint, TxOut>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl InputCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            coins: HashMap::new(),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// Make every previous output of `tx` available.
    pub fn fill<S>(&mut self, tx: &Transaction, source: &S) -> Result<(), Rejection>
    where
        S: TransactionSource + ?Sized,
    {
        if self.coins.len() > self.capacity {
            debug!(
                entries = self.coins.len(),
                capacity = self.capacity,
                hits = self.hits,
                misses = self.misses,
                "Flushing input cache"
            );
            self.coins.clear();
        }

        for input in &tx.inputs {
            let prevout = input.prevout;
            if self.coins.contains_key(&prevout) {
                self.hits += 1;
                continue;
            }
            self.misses += 1;

            let (prev_tx, _block_hash) = source
                .fetch_transaction(&prevout.txid)
                .ok_or(Rejection::MissingInputs(prevout))?;
            let output = prev_tx
                .outputs
                .get(prevout.vout as usize)
                .ok_or(Rejection::MissingInputs(prevout))?;
            trace!(txid = %prevout.txid, vout = prevout.vout, "Input cached");
            self.coins.insert(prevout, output.clone());
        }
        Ok(())
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&TxOut> {
        self.coins.get(outpoint)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.coins.len(),
        }
    }

    pub fn flush(&mut self) {
        self.coins.clear();
    }
}
