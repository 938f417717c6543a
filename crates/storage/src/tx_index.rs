//! Transaction index: validity records, sub-records and processing results.
//!
//! Persisted layout (column `transactions`):
//!
//! ```text
//! <txid>        valid:height:type:amendedAmount
//! <txid>-<n>    property:amount
//! ```
//!
//! Column `processing` maps `<txid>` to `position:result`. Values are
//! decoded into typed records as soon as they are read.

use crate::{Column, KeyValueStore, StorageError, WriteBatch};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tallyscan_types::{tx_type, BlockHeight, Hash, PropertyId};
use tracing::{debug, warn};

/// Current schema version of the index.
pub const DB_VERSION: u32 = 1;

const DB_VERSION_KEY: &[u8] = b"dbversion";

/// Validity record of one interpreted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRecord {
    pub valid: bool,
    pub height: BlockHeight,
    pub tx_type: u16,
    pub amended_amount: u64,
}

impl TxRecord {
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            u8::from(self.valid),
            self.height,
            self.tx_type,
            self.amended_amount
        )
    }
}

impl FromStr for TxRecord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(':').collect();
        let [valid, height, tx_type, amount] = fields.as_slice() else {
            return Err(format!("expected 4 fields, found {}", fields.len()));
        };
        let valid = match *valid {
            "1" => true,
            "0" => false,
            other => return Err(format!("bad validity flag {other:?}")),
        };
        Ok(TxRecord {
            valid,
            height: BlockHeight(height.parse().map_err(|_| format!("bad height {height:?}"))?),
            tx_type: tx_type.parse().map_err(|_| format!("bad type {tx_type:?}"))?,
            amended_amount: amount
                .parse()
                .map_err(|_| format!("bad amount {amount:?}"))?,
        })
    }
}

/// Per-payout record of a multi-payout transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRecord {
    pub property: PropertyId,
    pub amount: i64,
}

impl FromStr for SubRecord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (property, amount) = s.split_once(':').ok_or("missing ':'")?;
        Ok(SubRecord {
            property: property
                .parse()
                .map_err(|_| format!("bad property {property:?}"))?,
            amount: amount.parse().map_err(|_| format!("bad amount {amount:?}"))?,
        })
    }
}

/// Where a transaction sat in its block and what the interpreter said.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutcome {
    pub position: u32,
    pub result: i32,
}

impl FromStr for TxOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (position, result) = s.split_once(':').ok_or("missing ':'")?;
        Ok(TxOutcome {
            position: position
                .parse()
                .map_err(|_| format!("bad position {position:?}"))?,
            result: result.parse().map_err(|_| format!("bad result {result:?}"))?,
        })
    }
}

/// An indexed transaction, as listed for replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedTx {
    pub txid: Hash,
    pub record: TxRecord,
    pub position: u32,
}

/// Typed view over the `transactions` and `processing` columns.
#[derive(Clone)]
pub struct TxIndex {
    store: Arc<dyn KeyValueStore>,
}

impl TxIndex {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Record the validity of `txid`, replacing any earlier record.
    pub fn record_tx(&self, txid: &Hash, record: TxRecord) -> Result<(), StorageError> {
        let key = txid.to_hex();
        if let Some(old) = self.store.get(Column::Transactions, key.as_bytes())? {
            warn!(
                %txid,
                old = %String::from_utf8_lossy(&old),
                new = %record.encode(),
                "Overwriting existing transaction record"
            );
        }
        self.store
            .put(Column::Transactions, key.as_bytes(), record.encode().as_bytes())
    }

    /// Record sub-records `<txid>-1 .. <txid>-n`.
    pub fn record_sub_records(
        &self,
        txid: &Hash,
        subs: &[SubRecord],
    ) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        for (n, sub) in subs.iter().enumerate() {
            batch.put(
                Column::Transactions,
                format!("{}-{}", txid.to_hex(), n + 1),
                format!("{}:{}", sub.property, sub.amount),
            );
        }
        self.store.write(batch)
    }

    pub fn record_outcome(&self, txid: &Hash, outcome: TxOutcome) -> Result<(), StorageError> {
        self.store.put(
            Column::Processing,
            txid.to_hex().as_bytes(),
            format!("{}:{}", outcome.position, outcome.result).as_bytes(),
        )
    }

    pub fn get(&self, txid: &Hash) -> Result<Option<TxRecord>, StorageError> {
        let key = txid.to_hex();
        self.store
            .get(Column::Transactions, key.as_bytes())?
            .map(|v| decode(&key, &v))
            .transpose()
    }

    pub fn exists(&self, txid: &Hash) -> Result<bool, StorageError> {
        Ok(self.get(txid)?.is_some())
    }

    pub fn outcome(&self, txid: &Hash) -> Result<Option<TxOutcome>, StorageError> {
        let key = txid.to_hex();
        self.store
            .get(Column::Processing, key.as_bytes())?
            .map(|v| decode(&key, &v))
            .transpose()
    }

    pub fn sub_records(&self, txid: &Hash) -> Result<Vec<SubRecord>, StorageError> {
        let prefix = format!("{}-", txid.to_hex());
        let mut subs: Vec<(u32, SubRecord)> = Vec::new();
        for (key, value) in self
            .store
            .scan_prefix(Column::Transactions, prefix.as_bytes())?
        {
            let key = String::from_utf8_lossy(&key).into_owned();
            let n: u32 = key[prefix.len()..]
                .parse()
                .map_err(|_| StorageError::corrupt(&key, "bad sub-record number"))?;
            subs.push((n, decode(&key, &value)?));
        }
        // Keys sort lexically ("-10" before "-2").
        subs.sort_by_key(|(n, _)| *n);
        Ok(subs.into_iter().map(|(_, s)| s).collect())
    }

    /// Every validity record, in key order.
    pub fn records(&self) -> Result<Vec<(Hash, TxRecord)>, StorageError> {
        let mut records = Vec::new();
        for (key, value) in self.store.scan_prefix(Column::Transactions, b"")? {
            let key = String::from_utf8_lossy(&key).into_owned();
            if key.contains('-') {
                continue;
            }
            let txid = Hash::from_hex(&key).map_err(|e| StorageError::corrupt(&key, e.to_string()))?;
            records.push((txid, decode(&key, &value)?));
        }
        Ok(records)
    }

    pub fn total(&self) -> Result<usize, StorageError> {
        Ok(self.records()?.len())
    }

    pub fn count_in_block(&self, height: BlockHeight) -> Result<usize, StorageError> {
        Ok(self
            .records()?
            .iter()
            .filter(|(_, r)| r.height == height)
            .count())
    }

    /// Heights in `[from, to]` holding at least one record.
    pub fn seed_blocks(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> Result<BTreeSet<BlockHeight>, StorageError> {
        Ok(self
            .records()?
            .into_iter()
            .map(|(_, r)| r.height)
            .filter(|h| (from..=to).contains(h))
            .collect())
    }

    /// Whether any freeze-related record, valid or not, lies in `[from, to]`.
    pub fn has_freeze_in_range(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> Result<bool, StorageError> {
        Ok(self.records()?.iter().any(|(_, r)| {
            (from..=to).contains(&r.height) && tx_type::is_freeze_related(r.tx_type)
        }))
    }

    /// Valid records of the given types at or below `up_to`, ordered by
    /// (height, position).
    pub fn valid_of_types(
        &self,
        types: &[u16],
        up_to: BlockHeight,
    ) -> Result<Vec<IndexedTx>, StorageError> {
        let mut txs = Vec::new();
        for (txid, record) in self.records()? {
            if !record.valid || record.height > up_to || !types.contains(&record.tx_type) {
                continue;
            }
            let position = self.outcome(&txid)?.map_or(0, |o| o.position);
            txs.push(IndexedTx {
                txid,
                record,
                position,
            });
        }
        txs.sort_by_key(|t| (t.record.height, t.position));
        Ok(txs)
    }

    /// Delete every record with height in `[from, to]`, together with its
    /// sub-records and processing result. Returns the number of
    /// transactions removed.
    pub fn delete_range(&self, from: BlockHeight, to: BlockHeight) -> Result<usize, StorageError> {
        let mut batch = WriteBatch::new();
        let mut removed = 0;
        for (txid, record) in self.records()? {
            if !(from..=to).contains(&record.height) {
                continue;
            }
            let key = txid.to_hex();
            for (sub_key, _) in self
                .store
                .scan_prefix(Column::Transactions, format!("{key}-").as_bytes())?
            {
                batch.delete(Column::Transactions, sub_key);
            }
            batch.delete(Column::Processing, key.as_bytes());
            batch.delete(Column::Transactions, key.into_bytes());
            removed += 1;
        }
        self.store.write(batch)?;
        debug!(%from, %to, removed, "Deleted transaction records");
        Ok(removed)
    }

    pub fn db_version(&self) -> Result<Option<u32>, StorageError> {
        self.store
            .get(Column::Meta, DB_VERSION_KEY)?
            .map(|v| decode("dbversion", &v))
            .transpose()
    }

    pub fn set_db_version(&self, version: u32) -> Result<(), StorageError> {
        self.store
            .put(Column::Meta, DB_VERSION_KEY, version.to_string().as_bytes())
    }

    /// Remove every transaction and processing record.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.clear_column(Column::Transactions)?;
        self.store.clear_column(Column::Processing)
    }
}

fn decode<T>(key: &str, value: &[u8]) -> Result<T, StorageError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let s = std::str::from_utf8(value).map_err(|e| StorageError::corrupt(key, e.to_string()))?;
    s.parse().map_err(|e: T::Err| StorageError::corrupt(key, e.to_string()))
}
