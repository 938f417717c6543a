//! The tally ledger: every address's tally, keyed deterministically.

use crate::{Tally, TallyKind};
use std::collections::BTreeMap;
use tallyscan_types::{Address, PropertyId};
use tracing::{trace, warn};

/// Balance sheet for all addresses.
///
/// Addresses iterate in ascending order so snapshots of the ledger are
/// byte-stable. The ledger guards arithmetic only; freeze policy is the
/// caller's concern.
#[derive(Debug, Clone, Default)]
pub struct TallyLedger {
    tallies: BTreeMap<Address, Tally>,
}

impl TallyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a signed delta to (address, property, kind).
    ///
    /// Returns `false` with the ledger unchanged if the delta is zero, would
    /// overflow, or would take the counter below its minimum.
    pub fn update(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: i64,
        kind: TallyKind,
    ) -> bool {
        if amount == 0 {
            warn!(%address, %property, %kind, "Rejected zero-amount tally update");
            return false;
        }

        let applied = match self.tallies.get_mut(address) {
            Some(tally) => tally.update(property, amount, kind),
            None => {
                let mut tally = Tally::new();
                let ok = tally.update(property, amount, kind);
                if ok {
                    self.tallies.insert(address.clone(), tally);
                }
                ok
            }
        };

        if applied {
            trace!(%address, %property, %kind, amount, "Tally updated");
        } else {
            trace!(
                %address,
                %property,
                %kind,
                amount,
                balance = self.balance(address, property, kind),
                "Tally update out of range"
            );
        }
        applied
    }

    /// Add a positive amount.
    pub fn credit(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: i64,
        kind: TallyKind,
    ) -> bool {
        if amount < 0 {
            warn!(%address, %property, amount, "Rejected negative credit");
            return false;
        }
        self.update(address, property, amount, kind)
    }

    /// Subtract a positive amount.
    pub fn debit(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: i64,
        kind: TallyKind,
    ) -> bool {
        if amount < 0 {
            warn!(%address, %property, amount, "Rejected negative debit");
            return false;
        }
        // amount >= 0, so negation cannot overflow.
        self.update(address, property, -amount, kind)
    }

    pub fn balance(&self, address: &Address, property: PropertyId, kind: TallyKind) -> i64 {
        self.tallies
            .get(address)
            .map_or(0, |t| t.balance(property, kind))
    }

    /// Available for spend: see [`Tally::available_for_spend`].
    pub fn available(&self, address: &Address, property: PropertyId) -> i64 {
        self.tallies
            .get(address)
            .map_or(0, |t| t.available_for_spend(property))
    }

    /// Every property ever touched by `address`, in first-touch order.
    pub fn properties_of(&self, address: &Address) -> Vec<PropertyId> {
        self.tallies
            .get(address)
            .map(|t| t.properties().collect())
            .unwrap_or_default()
    }

    pub fn tally(&self, address: &Address) -> Option<&Tally> {
        self.tallies.get(address)
    }

    /// Tallies in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Tally)> {
        self.tallies.iter()
    }

    pub fn len(&self) -> usize {
        self.tallies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    pub fn clear(&mut self) {
        self.tallies.clear();
    }
}

/// Equality ignores addresses whose tallies are entirely zero.
impl PartialEq for TallyLedger {
    fn eq(&self, other: &Self) -> bool {
        fn live(l: &TallyLedger) -> Vec<(&Address, &Tally)> {
            l.tallies
                .iter()
                .filter(|(_, t)| !t.is_empty())
                .collect::<Vec<_>>()
        }
        live(self) == live(other)
    }
}

impl Eq for TallyLedger {}
