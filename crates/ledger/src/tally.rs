//! Per-address tally of balances.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tallyscan_types::PropertyId;

/// Balance kinds tracked independently for every (address, property).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TallyKind {
    Available,
    /// Funds provisionally reserved by unconfirmed transfers. May be negative.
    Pending,
}

impl TallyKind {
    /// Number of balance kinds; fixes the width of a tally entry.
    pub const COUNT: usize = 2;
    pub const ALL: [TallyKind; Self::COUNT] = [TallyKind::Available, TallyKind::Pending];

    fn index(self) -> usize {
        match self {
            TallyKind::Available => 0,
            TallyKind::Pending => 1,
        }
    }

    /// Smallest value a counter of this kind may hold.
    pub fn minimum(self) -> i64 {
        match self {
            TallyKind::Available => 0,
            TallyKind::Pending => i64::MIN,
        }
    }
}

impl fmt::Display for TallyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TallyKind::Available => f.write_str("available"),
            TallyKind::Pending => f.write_str("pending"),
        }
    }
}

type Counters = [i64; TallyKind::COUNT];

/// Balances of one address, one counter set per property.
///
/// Properties are remembered in the order they were first successfully
/// updated. That order survives zeroed balances and is what
/// [`Tally::properties`] yields.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    order: Vec<PropertyId>,
    counters: HashMap<PropertyId, Counters>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a signed delta to one counter.
    ///
    /// Returns `false` and leaves the tally untouched if the delta is zero,
    /// overflows, or would take the counter below the kind's minimum.
    pub fn update(&mut self, property: PropertyId, amount: i64, kind: TallyKind) -> bool {
        if amount == 0 {
            return false;
        }
        let current = self.balance(property, kind);
        let Some(next) = current.checked_add(amount) else {
            return false;
        };
        if next < kind.minimum() {
            return false;
        }

        let counters = self.counters.entry(property).or_insert_with(|| {
            self.order.push(property);
            [0; TallyKind::COUNT]
        });
        counters[kind.index()] = next;
        true
    }

    pub fn balance(&self, property: PropertyId, kind: TallyKind) -> i64 {
        self.counters
            .get(&property)
            .map_or(0, |c| c[kind.index()])
    }

    /// Amount the address may spend right now.
    ///
    /// A negative pending counter is funds reserved out of the available
    /// balance; a positive one is not spendable yet and is ignored.
    pub fn available_for_spend(&self, property: PropertyId) -> i64 {
        let available = self.balance(property, TallyKind::Available);
        let pending = self.balance(property, TallyKind::Pending);
        if pending < 0 {
            // available >= 0, so the sum cannot overflow.
            available + pending
        } else {
            available
        }
    }

    /// Properties in first-touch order.
    pub fn properties(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.order.iter().copied()
    }

    /// `(property, available, pending)` in first-touch order.
    pub fn entries(&self) -> impl Iterator<Item = (PropertyId, i64, i64)> + '_ {
        self.order.iter().map(|p| {
            let c = self.counters[p];
            (*p, c[0], c[1])
        })
    }

    /// True if every counter of every property is zero.
    pub fn is_empty(&self) -> bool {
        self.counters.values().all(|c| c.iter().all(|v| *v == 0))
    }
}

/// Equality ignores property order and properties whose counters are all zero.
impl PartialEq for Tally {
    fn eq(&self, other: &Self) -> bool {
        let non_zero = |t: &Tally| {
            t.counters
                .iter()
                .filter(|(_, c)| c.iter().any(|v| *v != 0))
                .map(|(p, c)| (*p, *c))
                .collect::<HashMap<_, _>>()
        };
        non_zero(self) == non_zero(other)
    }
}

impl Eq for Tally {}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: PropertyId = PropertyId(1);
    const P3: PropertyId = PropertyId(3);

    #[test]
    fn test_empty_tally_reads_zero() {
        let tally = Tally::new();
        for kind in TallyKind::ALL {
            assert_eq!(tally.balance(P1, kind), 0);
        }
        assert_eq!(tally.available_for_spend(P1), 0);
        assert_eq!(tally.properties().count(), 0);
    }

    #[test]
    fn test_zero_amount_is_rejected() {
        let mut tally = Tally::new();
        assert!(!tally.update(P1, 0, TallyKind::Available));
        assert_eq!(tally.properties().count(), 0);
    }

    #[test]
    fn test_available_cannot_go_negative() {
        let mut tally = Tally::new();
        assert!(tally.update(P1, 100, TallyKind::Available));
        assert!(!tally.update(P1, -101, TallyKind::Available));
        assert_eq!(tally.balance(P1, TallyKind::Available), 100);

        // Exactly the minimum is fine, one more unit is not.
        assert!(tally.update(P1, -100, TallyKind::Available));
        assert_eq!(tally.balance(P1, TallyKind::Available), 0);
        assert!(!tally.update(P1, -1, TallyKind::Available));
        assert_eq!(tally.balance(P1, TallyKind::Available), 0);
    }

    #[test]
    fn test_pending_reaches_i64_min() {
        let mut tally = Tally::new();
        assert!(tally.update(P1, i64::MIN, TallyKind::Pending));
        assert_eq!(tally.balance(P1, TallyKind::Pending), i64::MIN);
        assert!(!tally.update(P1, -1, TallyKind::Pending));
        assert_eq!(tally.balance(P1, TallyKind::Pending), i64::MIN);
    }

    #[test]
    fn test_overflow_is_rejected() {
        let mut tally = Tally::new();
        assert!(tally.update(P1, i64::MAX, TallyKind::Available));
        assert!(!tally.update(P1, 1, TallyKind::Available));
        assert_eq!(tally.balance(P1, TallyKind::Available), i64::MAX);
    }

    #[test]
    fn test_available_for_spend_uses_negative_pending_only() {
        let mut tally = Tally::new();
        tally.update(P1, 100, TallyKind::Available);
        tally.update(P1, 40, TallyKind::Pending);
        assert_eq!(tally.available_for_spend(P1), 100);

        tally.update(P1, -70, TallyKind::Pending);
        assert_eq!(tally.balance(P1, TallyKind::Pending), -30);
        assert_eq!(tally.available_for_spend(P1), 70);
    }

    #[test]
    fn test_available_for_spend_at_extremes() {
        let mut tally = Tally::new();
        tally.update(P1, i64::MAX, TallyKind::Available);
        tally.update(P1, i64::MIN, TallyKind::Pending);
        assert_eq!(tally.available_for_spend(P1), -1);
    }

    #[test]
    fn test_properties_keep_first_touch_order() {
        let mut tally = Tally::new();
        tally.update(P3, 5, TallyKind::Available);
        tally.update(P1, 7, TallyKind::Pending);
        tally.update(P3, -5, TallyKind::Available);
        tally.update(PropertyId(2), 1, TallyKind::Available);

        let order: Vec<_> = tally.properties().collect();
        assert_eq!(order, vec![P3, P1, PropertyId(2)]);
    }

    #[test]
    fn test_failed_update_does_not_register_property() {
        let mut tally = Tally::new();
        assert!(!tally.update(P1, -5, TallyKind::Available));
        assert_eq!(tally.properties().count(), 0);
    }

    #[test]
    fn test_equality_ignores_order_and_zero_entries() {
        let mut a = Tally::new();
        a.update(P1, 10, TallyKind::Available);
        a.update(P3, 20, TallyKind::Available);
        a.update(PropertyId(9), 4, TallyKind::Available);
        a.update(PropertyId(9), -4, TallyKind::Available);

        let mut b = Tally::new();
        b.update(P3, 20, TallyKind::Available);
        b.update(P1, 10, TallyKind::Available);
        assert_eq!(a, b);

        b.update(P1, 1, TallyKind::Pending);
        assert_ne!(a, b);
    }
}
