//! Read-only projections over the ledger.
//!
//! Nothing here is cached; callers recompute when the engine signals that
//! derived state changed.

use crate::{TallyKind, TallyLedger};
use serde::Serialize;
use std::collections::BTreeMap;
use tallyscan_types::{Address, PropertyId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropertyTotals {
    /// Sum of spendable balances.
    pub available: i64,
    /// Sum of pending counters.
    pub pending: i64,
}

/// Balances summed over the addresses a wallet owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalletSummary {
    /// Properties in the order they were first met while walking the
    /// ledger: ascending address, then each address's first-touch order.
    pub properties: Vec<PropertyId>,
    pub totals: BTreeMap<PropertyId, PropertyTotals>,
}

pub fn wallet_summary(ledger: &TallyLedger, is_mine: impl Fn(&Address) -> bool) -> WalletSummary {
    let mut summary = WalletSummary::default();
    for (address, tally) in ledger.iter() {
        if !is_mine(address) {
            continue;
        }
        for property in tally.properties() {
            let totals = summary.totals.entry(property).or_insert_with(|| {
                summary.properties.push(property);
                PropertyTotals::default()
            });
            totals.available = totals
                .available
                .saturating_add(tally.available_for_spend(property));
            totals.pending = totals
                .pending
                .saturating_add(tally.balance(property, TallyKind::Pending));
        }
    }
    summary
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenTotals {
    /// Sum of available balances across all addresses.
    pub total: i64,
    /// Number of addresses holding a non-zero available balance.
    pub owners: usize,
}

pub fn total_tokens(ledger: &TallyLedger, property: PropertyId) -> TokenTotals {
    let mut totals = TokenTotals::default();
    for (_, tally) in ledger.iter() {
        let balance = tally.balance(property, TallyKind::Available);
        if balance != 0 {
            totals.owners += 1;
            totals.total = totals.total.saturating_add(balance);
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallyscan_types::test_utils::test_address;

    fn ledger() -> TallyLedger {
        let mut ledger = TallyLedger::new();
        ledger.credit(&test_address("a"), PropertyId(5), 10, TallyKind::Available);
        ledger.credit(&test_address("a"), PropertyId(3), 4, TallyKind::Available);
        ledger.credit(&test_address("b"), PropertyId(3), 6, TallyKind::Available);
        ledger.debit(&test_address("b"), PropertyId(3), 2, TallyKind::Pending);
        ledger.credit(&test_address("c"), PropertyId(7), 1, TallyKind::Available);
        ledger
    }

    #[test]
    fn test_wallet_summary_only_counts_owned_addresses() {
        let mine = [test_address("a"), test_address("b")];
        let summary = wallet_summary(&ledger(), |a| mine.contains(a));

        assert_eq!(summary.properties, vec![PropertyId(5), PropertyId(3)]);
        assert_eq!(
            summary.totals[&PropertyId(3)],
            PropertyTotals {
                available: 8,
                pending: -2
            }
        );
        assert!(!summary.totals.contains_key(&PropertyId(7)));
    }

    #[test]
    fn test_total_tokens_counts_owners() {
        let totals = total_tokens(&ledger(), PropertyId(3));
        assert_eq!(totals, TokenTotals { total: 10, owners: 2 });
        assert_eq!(total_tokens(&ledger(), PropertyId(99)), TokenTotals::default());
    }
}
