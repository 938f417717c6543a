//! Property registry and the persisted watermark.
//!
//! Entries live in the `properties` column under `p-<id>`. Every
//! registration or update also writes `h-<blockhash>-<id>` holding the entry
//! as it was before that block touched it (empty if the block created it),
//! so a disconnected block can be undone with [`PropertyRegistry::pop_block`].

use crate::{Column, KeyValueStore, StorageError, WriteBatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tallyscan_types::{Address, Ecosystem, Hash, PropertyId};
use tracing::{debug, info};

const WATERMARK_KEY: &[u8] = b"watermark";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub issuer: Address,
    pub name: String,
    pub divisible: bool,
    pub creation_txid: Hash,
    pub creation_block: Hash,
    /// Block of the most recent change to this entry.
    pub update_block: Hash,
}

/// Issued properties, their id counters, and the watermark block hash.
pub struct PropertyRegistry {
    store: Arc<dyn KeyValueStore>,
    next_main: PropertyId,
    next_test: PropertyId,
}

impl std::fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("next_main", &self.next_main)
            .field("next_test", &self.next_test)
            .finish_non_exhaustive()
    }
}

fn entry_key(id: PropertyId) -> String {
    format!("p-{:010}", id.0)
}

fn history_prefix(block: &Hash) -> String {
    format!("h-{}-", block.to_hex())
}

impl PropertyRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            next_main: Ecosystem::Main.first_issued(),
            next_test: Ecosystem::Test.first_issued(),
        }
    }

    /// Restore the id counters, typically from a checkpoint.
    pub fn init(&mut self, next_main: PropertyId, next_test: PropertyId) {
        self.next_main = next_main;
        self.next_test = next_test;
    }

    pub fn peek_next(&self, ecosystem: Ecosystem) -> PropertyId {
        match ecosystem {
            Ecosystem::Main => self.next_main,
            Ecosystem::Test => self.next_test,
        }
    }

    /// Register a new property and return its id.
    pub fn register(
        &mut self,
        ecosystem: Ecosystem,
        entry: PropertyEntry,
    ) -> Result<PropertyId, StorageError> {
        let id = self.peek_next(ecosystem);
        let mut batch = WriteBatch::new();
        batch.put(Column::Properties, entry_key(id), encode_entry(&entry)?);
        self.put_history(&mut batch, &entry.creation_block, id, None)?;
        self.store.write(batch)?;

        let next = PropertyId(id.0 + 1);
        match ecosystem {
            Ecosystem::Main => self.next_main = next,
            Ecosystem::Test => self.next_test = next,
        }
        info!(property = %id, name = %entry.name, "Property registered");
        Ok(id)
    }

    /// Replace an existing entry. `entry.update_block` names the block
    /// making the change.
    pub fn update(&mut self, id: PropertyId, entry: PropertyEntry) -> Result<(), StorageError> {
        let previous = self
            .get(id)?
            .ok_or_else(|| StorageError::corrupt(entry_key(id), "update of unknown property"))?;
        let mut batch = WriteBatch::new();
        self.put_history(&mut batch, &entry.update_block, id, Some(&previous))?;
        batch.put(Column::Properties, entry_key(id), encode_entry(&entry)?);
        self.store.write(batch)
    }

    /// Keep only the first pre-image a block records for a property.
    fn put_history(
        &self,
        batch: &mut WriteBatch,
        block: &Hash,
        id: PropertyId,
        previous: Option<&PropertyEntry>,
    ) -> Result<(), StorageError> {
        let key = format!("{}{:010}", history_prefix(block), id.0);
        if self.store.get(Column::Properties, key.as_bytes())?.is_some() {
            return Ok(());
        }
        let value = match previous {
            Some(entry) => encode_entry(entry)?,
            None => Vec::new(),
        };
        batch.put(Column::Properties, key, value);
        Ok(())
    }

    pub fn get(&self, id: PropertyId) -> Result<Option<PropertyEntry>, StorageError> {
        let key = entry_key(id);
        match self.store.get(Column::Properties, key.as_bytes())? {
            Some(value) => decode_entry(&key, &value).map(Some),
            None => Ok(None),
        }
    }

    pub fn exists(&self, id: PropertyId) -> Result<bool, StorageError> {
        if id == PropertyId::NATIVE || id == PropertyId::TEST_NATIVE {
            return Ok(true);
        }
        Ok(self.get(id)?.is_some())
    }

    /// Native tokens are divisible; unknown properties report `None`.
    pub fn is_divisible(&self, id: PropertyId) -> Result<Option<bool>, StorageError> {
        if id == PropertyId::NATIVE || id == PropertyId::TEST_NATIVE {
            return Ok(Some(true));
        }
        Ok(self.get(id)?.map(|e| e.divisible))
    }

    /// Number of registered (non-native) properties.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.store.scan_prefix(Column::Properties, b"p-")?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Undo every registration and update made in `block`. Returns the
    /// number of properties remaining.
    pub fn pop_block(&mut self, block: &Hash) -> Result<usize, StorageError> {
        let prefix = history_prefix(block);
        let history = self
            .store
            .scan_prefix(Column::Properties, prefix.as_bytes())?;
        let mut batch = WriteBatch::new();

        for (key, value) in &history {
            let key_str = String::from_utf8_lossy(key);
            let id: u32 = key_str[prefix.len()..]
                .parse()
                .map_err(|_| StorageError::corrupt(key_str.to_string(), "bad property id"))?;
            let id = PropertyId(id);
            if value.is_empty() {
                batch.delete(Column::Properties, entry_key(id));
            } else {
                // Validate before restoring.
                decode_entry(&key_str, value)?;
                batch.put(Column::Properties, entry_key(id), value.clone());
            }
            batch.delete(Column::Properties, key.clone());
        }
        self.store.write(batch)?;

        let remaining = self.len()?;
        if !history.is_empty() {
            debug!(block = %block, undone = history.len(), remaining, "Popped property registry block");
        }
        Ok(remaining)
    }

    /// Block hash of the most recent block reflected in the index.
    pub fn watermark(&self) -> Result<Option<Hash>, StorageError> {
        let Some(value) = self.store.get(Column::Meta, WATERMARK_KEY)? else {
            return Ok(None);
        };
        let s = String::from_utf8_lossy(&value);
        Hash::from_hex(&s)
            .map(Some)
            .map_err(|e| StorageError::corrupt("watermark", e.to_string()))
    }

    pub fn set_watermark(&self, block: &Hash) -> Result<(), StorageError> {
        self.store
            .put(Column::Meta, WATERMARK_KEY, block.to_hex().as_bytes())
    }

    /// Drop every entry, all history and the watermark, and reset the id
    /// counters.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.store.clear_column(Column::Properties)?;
        self.store.delete(Column::Meta, WATERMARK_KEY)?;
        self.next_main = Ecosystem::Main.first_issued();
        self.next_test = Ecosystem::Test.first_issued();
        Ok(())
    }
}

fn encode_entry(entry: &PropertyEntry) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(entry).map_err(|e| StorageError::DatabaseError(e.to_string()))
}

fn decode_entry(key: &str, value: &[u8]) -> Result<PropertyEntry, StorageError> {
    serde_json::from_slice(value).map_err(|e| StorageError::corrupt(key, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use tallyscan_types::test_utils::{test_address, test_hash};

    fn entry(name: &str, block: Hash) -> PropertyEntry {
        PropertyEntry {
            issuer: test_address("issuer"),
            name: name.to_string(),
            divisible: false,
            creation_txid: test_hash(0xcc),
            creation_block: block,
            update_block: block,
        }
    }

    #[test]
    fn test_ids_are_sequential_per_ecosystem() {
        let mut registry = PropertyRegistry::new(Arc::new(MemoryStore::new()));
        let a = registry
            .register(Ecosystem::Main, entry("A", test_hash(1)))
            .unwrap();
        let b = registry
            .register(Ecosystem::Main, entry("B", test_hash(1)))
            .unwrap();
        let t = registry
            .register(Ecosystem::Test, entry("T", test_hash(1)))
            .unwrap();
        assert_eq!((a, b, t), (PropertyId(3), PropertyId(4), PropertyId(0x8000_0003)));
        assert_eq!(registry.peek_next(Ecosystem::Main), PropertyId(5));
        assert_eq!(registry.is_divisible(a).unwrap(), Some(false));
        assert_eq!(registry.is_divisible(PropertyId::NATIVE).unwrap(), Some(true));
        assert_eq!(registry.is_divisible(PropertyId(99)).unwrap(), None);
    }

    #[test]
    fn test_pop_block_undoes_registrations_and_updates() {
        let mut registry = PropertyRegistry::new(Arc::new(MemoryStore::new()));
        let id = registry
            .register(Ecosystem::Main, entry("A", test_hash(1)))
            .unwrap();
        registry
            .register(Ecosystem::Main, entry("B", test_hash(2)))
            .unwrap();

        let mut renamed = entry("A2", test_hash(1));
        renamed.update_block = test_hash(2);
        registry.update(id, renamed.clone()).unwrap();
        let mut again = renamed.clone();
        again.name = "A3".into();
        registry.update(id, again).unwrap();

        let remaining = registry.pop_block(&test_hash(2)).unwrap();
        assert_eq!(remaining, 1);
        assert_eq!(registry.get(id).unwrap().unwrap().name, "A");
        assert_eq!(registry.get(PropertyId(4)).unwrap(), None);

        // Nothing recorded for an unrelated block.
        assert_eq!(registry.pop_block(&test_hash(9)).unwrap(), 1);
    }

    #[test]
    fn test_watermark_and_clear() {
        let mut registry = PropertyRegistry::new(Arc::new(MemoryStore::new()));
        assert_eq!(registry.watermark().unwrap(), None);
        registry.set_watermark(&test_hash(7)).unwrap();
        assert_eq!(registry.watermark().unwrap(), Some(test_hash(7)));

        registry
            .register(Ecosystem::Main, entry("A", test_hash(1)))
            .unwrap();
        registry.clear().unwrap();
        assert_eq!(registry.watermark().unwrap(), None);
        assert!(registry.is_empty().unwrap());
        assert_eq!(registry.peek_next(Ecosystem::Main), PropertyId(3));
    }
}
