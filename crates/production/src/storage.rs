//! # RocksDB Storage
//!
//! Production [`KeyValueStore`] backed by RocksDB. Each [`Column`] maps to
//! a column family of the same name.
//!
//! All operations are synchronous blocking I/O. Callers in async contexts
//! should use `spawn_blocking` to avoid blocking the runtime.

use crate::metrics;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteOptions, DB};
use serde::Deserialize;
use std::path::Path;
use std::time::Instant;
use tallyscan_storage::{BatchOp, Column, KeyValueStore, StorageError, WriteBatch};
use tracing::{debug, info};

/// RocksDB-based index store.
///
/// Features:
/// - Column families for logical separation
/// - LZ4 compression for disk efficiency
/// - Block cache for read performance
/// - Bloom filters for key existence checks
pub struct RocksDbStore {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for RocksDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbStore")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish_non_exhaustive()
    }
}

fn db_error(e: rocksdb::Error) -> StorageError {
    StorageError::DatabaseError(e.to_string())
}

impl RocksDbStore {
    /// Open or create a database at the given path with default settings.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::open_with_config(path, RocksDbConfig::default())
    }

    /// Open with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: RocksDbConfig,
    ) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        // Performance tuning
        opts.set_max_background_jobs(config.max_background_jobs);
        if config.bytes_per_sync > 0 {
            opts.set_bytes_per_sync(config.bytes_per_sync as u64);
        }
        opts.set_keep_log_file_num(config.keep_log_file_num);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_write_buffer_size(config.write_buffer_size);

        opts.set_compression_type(config.compression.to_rocksdb());

        // Block cache and bloom filter
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        if let Some(cache_size) = config.block_cache_size {
            let cache = rocksdb::Cache::new_lru_cache(cache_size);
            block_opts.set_block_cache(&cache);
        }
        if config.bloom_filter_bits > 0.0 {
            block_opts.set_bloom_filter(config.bloom_filter_bits, false);
        }
        opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors: Vec<_> = Column::ALL
            .iter()
            .map(|c| ColumnFamilyDescriptor::new(c.name(), Options::default()))
            .collect();

        let path = path.as_ref();
        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors).map_err(db_error)?;
        info!(path = %path.display(), "RocksDB index opened");

        Ok(Self {
            db,
            sync_writes: config.sync_writes,
        })
    }

    fn cf(&self, column: Column) -> Result<&ColumnFamily, StorageError> {
        self.db.cf_handle(column.name()).ok_or_else(|| {
            StorageError::DatabaseError(format!("Column family {} not found", column.name()))
        })
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let start = Instant::now();
        let result = self.db.get_cf(self.cf(column)?, key).map_err(db_error);
        metrics::record_kv_read(start.elapsed().as_secs_f64());
        result
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let start = Instant::now();
        let iter = self
            .db
            .iterator_cf(self.cf(column)?, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(db_error)?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        metrics::record_kv_read(start.elapsed().as_secs_f64());
        Ok(entries)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let start = Instant::now();
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.ops() {
            match op {
                BatchOp::Put { column, key, value } => {
                    rocks_batch.put_cf(self.cf(*column)?, key, value);
                }
                BatchOp::Delete { column, key } => {
                    rocks_batch.delete_cf(self.cf(*column)?, key);
                }
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(rocks_batch, &write_opts).map_err(db_error)?;
        metrics::record_kv_write(start.elapsed().as_secs_f64());
        Ok(())
    }

    fn clear_column(&self, column: Column) -> Result<(), StorageError> {
        let cf = self.cf(column)?;
        let mut batch = rocksdb::WriteBatch::default();
        let mut removed = 0usize;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.map_err(db_error)?;
            batch.delete_cf(cf, key);
            removed += 1;
        }
        self.db.write(batch).map_err(db_error)?;
        debug!(column = column.name(), removed, "Column cleared");
        Ok(())
    }
}

/// Compression type for RocksDB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    Snappy,
    Zlib,
    #[default]
    Lz4,
    Lz4hc,
    Zstd,
}

impl CompressionType {
    fn to_rocksdb(self) -> rocksdb::DBCompressionType {
        match self {
            CompressionType::None => rocksdb::DBCompressionType::None,
            CompressionType::Snappy => rocksdb::DBCompressionType::Snappy,
            CompressionType::Zlib => rocksdb::DBCompressionType::Zlib,
            CompressionType::Lz4 => rocksdb::DBCompressionType::Lz4,
            CompressionType::Lz4hc => rocksdb::DBCompressionType::Lz4hc,
            CompressionType::Zstd => rocksdb::DBCompressionType::Zstd,
        }
    }
}

/// Configuration for RocksDB storage.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Maximum number of background jobs
    pub max_background_jobs: i32,
    /// Write buffer size in bytes
    pub write_buffer_size: usize,
    /// Maximum number of write buffers
    pub max_write_buffer_number: i32,
    /// Block cache size in bytes (None to disable)
    pub block_cache_size: Option<usize>,
    pub compression: CompressionType,
    /// Bloom filter bits per key (0 to disable)
    pub bloom_filter_bits: f64,
    /// Bytes per sync (0 to disable)
    pub bytes_per_sync: usize,
    /// Number of log files to keep
    pub keep_log_file_num: usize,
    /// fsync every batch before returning.
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            max_background_jobs: 4,
            write_buffer_size: 64 * 1024 * 1024, // 64MB
            max_write_buffer_number: 3,
            block_cache_size: Some(256 * 1024 * 1024), // 256MB
            compression: CompressionType::Lz4,
            bloom_filter_bits: 10.0,
            bytes_per_sync: 1024 * 1024, // 1MB
            keep_log_file_num: 10,
            sync_writes: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(temp_dir.path()).unwrap();

        assert_eq!(store.get(Column::Meta, b"dbversion").unwrap(), None);
        store.put(Column::Meta, b"dbversion", b"1").unwrap();
        assert_eq!(
            store.get(Column::Meta, b"dbversion").unwrap(),
            Some(b"1".to_vec())
        );

        // Columns are independent.
        assert_eq!(store.get(Column::Transactions, b"dbversion").unwrap(), None);

        store.delete(Column::Meta, b"dbversion").unwrap();
        assert_eq!(store.get(Column::Meta, b"dbversion").unwrap(), None);
    }

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(temp_dir.path()).unwrap();
        for key in ["b-2", "a-1", "b-1", "c"] {
            store.put(Column::Transactions, key.as_bytes(), b"x").unwrap();
        }
        store.put(Column::Processing, b"b-0", b"x").unwrap();

        let keys: Vec<_> = store
            .scan_prefix(Column::Transactions, b"b-")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"b-1".to_vec(), b"b-2".to_vec()]);
    }

    #[test]
    fn test_batch_and_clear_column() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksDbStore::open_with_config(
            temp_dir.path(),
            RocksDbConfig {
                sync_writes: true,
                compression: CompressionType::None,
                ..Default::default()
            },
        )
        .unwrap();

        let mut batch = WriteBatch::new();
        batch.put(Column::Properties, "p-1", "one");
        batch.put(Column::Properties, "p-2", "two");
        batch.put(Column::Meta, "watermark", "abc");
        batch.delete(Column::Properties, "p-1");
        store.write(batch).unwrap();

        assert_eq!(store.scan_prefix(Column::Properties, b"p-").unwrap().len(), 1);

        store.clear_column(Column::Properties).unwrap();
        assert!(store.scan_prefix(Column::Properties, b"").unwrap().is_empty());
        assert!(store.get(Column::Meta, b"watermark").unwrap().is_some());
    }

    #[test]
    fn test_data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = RocksDbStore::open(temp_dir.path()).unwrap();
            store.put(Column::Meta, b"watermark", b"00ff").unwrap();
        }
        let store = RocksDbStore::open(temp_dir.path()).unwrap();
        assert_eq!(
            store.get(Column::Meta, b"watermark").unwrap(),
            Some(b"00ff".to_vec())
        );
    }
}
