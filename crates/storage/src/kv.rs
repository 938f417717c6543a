//! Ordered, column-partitioned key-value store.

use crate::StorageError;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Logical partitions of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    /// Transaction validity records and their sub-records.
    Transactions,
    /// Block position and interpretation result per transaction.
    Processing,
    /// Property registry entries and per-block history.
    Properties,
    /// Watermark and schema version.
    Meta,
}

impl Column {
    pub const ALL: [Column; 4] = [
        Column::Transactions,
        Column::Processing,
        Column::Properties,
        Column::Meta,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::Transactions => "transactions",
            Column::Processing => "processing",
            Column::Properties => "properties",
            Column::Meta => "meta",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put {
        column: Column,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        column: Column,
        key: Vec<u8>,
    },
}

/// Writes applied atomically by [`KeyValueStore::write`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            column,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, column: Column, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete {
            column,
            key: key.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// Backend for the auxiliary index.
///
/// Implementations must iterate keys in ascending byte order.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Apply every operation of `batch` or none of them.
    fn write(&self, batch: WriteBatch) -> Result<(), StorageError>;

    fn clear_column(&self, column: Column) -> Result<(), StorageError>;

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.put(column, key, value);
        self.write(batch)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.delete(column, key);
        self.write(batch)
    }
}

/// In-memory [`KeyValueStore`] for tests and simulation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    columns: RwLock<BTreeMap<Column, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in `column`.
    pub fn len(&self, column: Column) -> usize {
        self.columns.read().get(&column).map_or(0, |c| c.len())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .columns
            .read()
            .get(&column)
            .and_then(|c| c.get(key).cloned()))
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let columns = self.columns.read();
        let Some(entries) = columns.get(&column) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut columns = self.columns.write();
        for op in batch.ops {
            match op {
                BatchOp::Put { column, key, value } => {
                    columns.entry(column).or_default().insert(key, value);
                }
                BatchOp::Delete { column, key } => {
                    if let Some(entries) = columns.get_mut(&column) {
                        entries.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn clear_column(&self, column: Column) -> Result<(), StorageError> {
        self.columns.write().remove(&column);
        Ok(())
    }
}
