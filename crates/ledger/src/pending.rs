//! Funds reserved by unconfirmed transfers.

use crate::{TallyKind, TallyLedger};
use std::collections::HashMap;
use tallyscan_types::{Address, Hash, PropertyId};
use tracing::{debug, warn};

/// A reservation held against the pending counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub address: Address,
    pub property: PropertyId,
    pub amount: i64,
}

/// Reservations keyed by the id of the unconfirmed transaction.
///
/// Adding debits the pending counter; removing credits it back. Every
/// transaction that appears in a connected block is removed before it is
/// classified.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: HashMap<Hash, PendingEntry>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `amount` for `txid`. Returns `false` if the ledger refuses the
    /// update or the transaction already holds a reservation.
    pub fn add(
        &mut self,
        ledger: &mut TallyLedger,
        txid: Hash,
        address: Address,
        property: PropertyId,
        amount: i64,
    ) -> bool {
        if amount <= 0 || self.entries.contains_key(&txid) {
            return false;
        }
        if !ledger.debit(&address, property, amount, TallyKind::Pending) {
            return false;
        }
        debug!(%txid, %address, %property, amount, "Pending reservation added");
        self.entries.insert(
            txid,
            PendingEntry {
                address,
                property,
                amount,
            },
        );
        true
    }

    /// Release the reservation for `txid`, if any.
    pub fn remove(&mut self, ledger: &mut TallyLedger, txid: &Hash) -> Option<PendingEntry> {
        let entry = self.entries.remove(txid)?;
        if !ledger.credit(&entry.address, entry.property, entry.amount, TallyKind::Pending) {
            warn!(
                %txid,
                address = %entry.address,
                property = %entry.property,
                amount = entry.amount,
                "Pending reservation released but the ledger refused to restore it"
            );
        }
        debug!(%txid, address = %entry.address, property = %entry.property, "Pending reservation released");
        Some(entry)
    }

    pub fn get(&self, txid: &Hash) -> Option<&PendingEntry> {
        self.entries.get(txid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every reservation without touching the ledger. Used when the
    /// ledger itself is being wiped.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
