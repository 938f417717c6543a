//! Persistence for the tallyscan engine.
//!
//! Two stores with different guarantees:
//!
//! - [`CheckpointStore`]: per-block snapshot files of the ledger and global
//!   counters, each closed by a double-SHA-256 integrity tag
//! - [`KeyValueStore`]: an ordered index holding transaction records
//!   ([`TxIndex`]), the property registry ([`PropertyRegistry`]) and the
//!   watermark
//!
//! [`MemoryStore`] backs the index in tests and simulation; the production
//! crate provides a RocksDB backend.

mod checkpoint;
mod error;
mod kv;
mod registry;
mod tx_index;

pub use checkpoint::{
    encode_balances, encode_globals, Checkpoint, CheckpointKind, CheckpointStore, GlobalCounters,
};
pub use error::{CheckpointError, StorageError};
pub use kv::{BatchOp, Column, KeyValueStore, MemoryStore, WriteBatch};
pub use registry::{PropertyEntry, PropertyRegistry};
pub use tx_index::{IndexedTx, SubRecord, TxIndex, TxOutcome, TxRecord, DB_VERSION};
