//! Consensus hash over derived state and verification against published
//! checkpoints.
//!
//! The hash is a SHA-256 over one line per non-zero available balance,
//! `address|property|available`, with addresses and then properties
//! ascending, followed by `legacy|next_main|next_test`. Every line ends in
//! `\n`.
//!
//! Pending amounts are wallet-local reservations and are not hashed.

use crate::ConsensusCheckpoint;
use sha2::{Digest, Sha256};
use tallyscan_ledger::TallyLedger;
use tallyscan_storage::GlobalCounters;
use tallyscan_types::{BlockHeight, Hash};

pub fn consensus_hash(ledger: &TallyLedger, globals: &GlobalCounters) -> Hash {
    let mut hasher = Sha256::new();
    for (address, tally) in ledger.iter() {
        let mut entries: Vec<_> = tally
            .entries()
            .filter(|(_, available, _)| *available != 0)
            .map(|(property, available, _)| (property, available))
            .collect();
        entries.sort_by_key(|(property, _)| *property);
        for (property, available) in entries {
            hasher.update(format!("{address}|{property}|{available}\n").as_bytes());
        }
    }
    hasher.update(
        format!(
            "{}|{}|{}\n",
            globals.legacy_counter, globals.next_main, globals.next_test
        )
        .as_bytes(),
    );
    Hash::from_bytes(hasher.finalize().into())
}

/// Result of checking a block against the published checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointVerdict {
    /// No checkpoint is published for the height.
    Unchecked,
    Match,
    Mismatch { expected: ConsensusCheckpoint },
}

pub fn verify_checkpoint(
    checkpoints: &[ConsensusCheckpoint],
    height: BlockHeight,
    block_hash: &Hash,
    state_hash: &Hash,
) -> CheckpointVerdict {
    match checkpoints.iter().find(|c| c.height == height) {
        None => CheckpointVerdict::Unchecked,
        Some(c) if c.block_hash == *block_hash && c.consensus_hash == *state_hash => {
            CheckpointVerdict::Match
        }
        Some(c) => CheckpointVerdict::Mismatch { expected: *c },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallyscan_ledger::TallyKind;
    use tallyscan_types::test_utils::{test_address, test_hash};
    use tallyscan_types::PropertyId;

    #[test]
    fn test_hash_ignores_touch_order_and_zero_entries() {
        let a = test_address("a");
        let b = test_address("b");

        let mut first = TallyLedger::new();
        first.credit(&a, PropertyId(5), 10, TallyKind::Available);
        first.credit(&a, PropertyId(3), 7, TallyKind::Available);
        first.credit(&b, PropertyId(9), 1, TallyKind::Available);
        first.debit(&b, PropertyId(9), 1, TallyKind::Available);

        let mut second = TallyLedger::new();
        second.credit(&a, PropertyId(3), 7, TallyKind::Available);
        second.credit(&a, PropertyId(5), 10, TallyKind::Available);

        let globals = GlobalCounters::default();
        assert_eq!(consensus_hash(&first, &globals), consensus_hash(&second, &globals));
    }

    #[test]
    fn test_hash_ignores_pending_and_covers_globals() {
        let a = test_address("a");
        let mut ledger = TallyLedger::new();
        ledger.credit(&a, PropertyId(3), 7, TallyKind::Available);
        let globals = GlobalCounters::default();
        let base = consensus_hash(&ledger, &globals);

        let mut pending = ledger.clone();
        pending.debit(&a, PropertyId(3), 2, TallyKind::Pending);
        pending.debit(&test_address("b"), PropertyId(3), 5, TallyKind::Pending);
        assert_eq!(consensus_hash(&pending, &globals), base);

        let mut spent = ledger.clone();
        spent.debit(&a, PropertyId(3), 2, TallyKind::Available);
        assert_ne!(consensus_hash(&spent, &globals), base);

        let bumped = GlobalCounters {
            next_main: PropertyId(4),
            ..globals
        };
        assert_ne!(consensus_hash(&ledger, &bumped), base);
    }

    #[test]
    fn test_empty_state_hash_is_fixed() {
        let globals = GlobalCounters::default();
        let expected = Hash::sha256(format!("0|3|{}\n", 0x8000_0003u32).as_bytes());
        assert_eq!(consensus_hash(&TallyLedger::new(), &globals), expected);
    }

    #[test]
    fn test_lines_are_delimited() {
        let globals = GlobalCounters::default();
        let mut split_early = TallyLedger::new();
        split_early.credit(&test_address("a"), PropertyId(3), 15, TallyKind::Available);
        let mut split_late = TallyLedger::new();
        split_late.credit(&test_address("a"), PropertyId(31), 5, TallyKind::Available);
        assert_ne!(
            consensus_hash(&split_early, &globals),
            consensus_hash(&split_late, &globals)
        );

        let mut lines = Sha256::new();
        lines.update(b"addra|3|15\n");
        lines.update(format!("0|3|{}\n", 0x8000_0003u32).as_bytes());
        assert_eq!(
            consensus_hash(&split_early, &globals),
            Hash::from_bytes(lines.finalize().into())
        );
    }

    #[test]
    fn test_verify_checkpoint() {
        let checkpoints = [ConsensusCheckpoint {
            height: BlockHeight(10),
            block_hash: test_hash(1),
            consensus_hash: test_hash(2),
        }];
        let v = |h, b, s| verify_checkpoint(&checkpoints, BlockHeight(h), &test_hash(b), &test_hash(s));

        assert_eq!(v(9, 9, 9), CheckpointVerdict::Unchecked);
        assert_eq!(v(10, 1, 2), CheckpointVerdict::Match);
        assert!(matches!(v(10, 1, 3), CheckpointVerdict::Mismatch { .. }));
        assert!(matches!(v(10, 4, 2), CheckpointVerdict::Mismatch { .. }));
    }
}
