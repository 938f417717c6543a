//! Reorganization handling.
//!
//! Every test ends by comparing the reorganized engine with a fresh engine
//! that scanned the final chain from scratch.

use tallyscan_engine::{Engine, EngineConfig, RecoveryOutcome, ReorgState};
use tallyscan_simulation::{
    tagged, Harness, ObservedEvent, Payload, Workload, WorkloadConfig, MANAGED_PROPERTY,
};
use tallyscan_types::{tx_type, BlockHeight, Transaction};

fn workload_config() -> WorkloadConfig {
    WorkloadConfig {
        blocks: 25,
        ..Default::default()
    }
}

/// Fresh engine over a chain with the same blocks as `harness.chain`.
fn fresh_engine(harness: &Harness, branches: &[(u64, Vec<Transaction>)]) -> (Harness, Engine) {
    let fresh = Harness::new(harness.config.clone()).unwrap();
    for (branch, txs) in branches {
        fresh.chain.push_block(*branch, txs.clone());
    }
    assert_eq!(fresh.chain.tip(), harness.chain.tip());
    let (engine, _) = fresh.start().unwrap();
    (fresh, engine)
}

fn assert_same_state(workload: &Workload, a: &Engine, b: &Engine) {
    assert_eq!(a.watermark(), b.watermark());
    assert_eq!(a.consensus_hash(), b.consensus_hash());
    assert_eq!(a.freeze_state(), b.freeze_state());
    for actor in &workload.actors {
        assert_eq!(
            a.balance(actor, MANAGED_PROPERTY),
            b.balance(actor, MANAGED_PROPERTY),
            "balance of {actor}"
        );
    }
}

#[test]
fn test_shallow_reorg_restores_checkpoint() {
    let config = workload_config();
    let workload = Workload::generate(config.clone(), 17);
    let harness = Harness::new(EngineConfig::default()).unwrap();
    harness.load(&workload);
    let (mut engine, _) = harness.start().unwrap();
    harness.observer.clear();

    let removed = harness.disconnect(&mut engine, 3);
    assert_eq!(removed.len(), 3);
    assert_eq!(
        engine.reorg_state(),
        ReorgState::Disconnecting {
            max_height: BlockHeight(24)
        }
    );
    // Nothing is rolled back until the next block arrives.
    assert_eq!(engine.watermark(), Some(BlockHeight(24)));

    let mut branches: Vec<(u64, Vec<Transaction>)> =
        workload.blocks[..22].iter().map(|b| (0, b.clone())).collect();
    for seed in 0..4 {
        let txs = workload.extra_block(&config, 500 + seed, 4);
        harness.connect(&mut engine, 1, txs.clone()).unwrap();
        branches.push((1, txs));
    }

    assert_eq!(engine.reorg_state(), ReorgState::Normal);
    assert_eq!(
        harness.observer.recoveries(),
        vec![RecoveryOutcome::Restored {
            height: BlockHeight(21)
        }]
    );
    assert_eq!(
        harness
            .observer
            .count(|e| matches!(e, ObservedEvent::StateInvalidated)),
        1
    );
    for tx in removed.iter().flat_map(|b| b.transactions.iter()) {
        assert!(!engine.tx_index().exists(&tx.txid).unwrap());
    }

    let (_fresh, fresh) = fresh_engine(&harness, &branches);
    assert_same_state(&workload, &engine, &fresh);
}

#[test]
fn test_reorg_over_freeze_forces_full_reparse() {
    let config = workload_config();
    let workload = Workload::generate(config.clone(), 23);
    let harness = Harness::new(EngineConfig::default()).unwrap();
    harness.load(&workload);
    let (mut engine, _) = harness.start().unwrap();

    let enable = Payload::new(tx_type::ENABLE_FREEZING, MANAGED_PROPERTY, 0).encode();
    let enable_tx = tagged("enable-on-stale", b"omni", &workload.funding[0], &enable, None);
    harness.connect(&mut engine, 0, vec![enable_tx.clone()]).unwrap();
    assert!(engine.tx_index().get(&enable_tx.txid).unwrap().unwrap().valid);
    harness.observer.clear();

    harness.disconnect(&mut engine, 1);
    let replacement = workload.extra_block(&config, 900, 3);
    harness.connect(&mut engine, 1, replacement.clone()).unwrap();

    assert!(matches!(
        harness.observer.recoveries().as_slice(),
        [RecoveryOutcome::FullReparse { .. }]
    ));
    assert!(engine.freeze_state().is_empty());
    assert!(!engine.tx_index().exists(&enable_tx.txid).unwrap());

    let mut branches: Vec<(u64, Vec<Transaction>)> =
        workload.blocks.iter().map(|b| (0, b.clone())).collect();
    branches.push((1, replacement));
    let (_fresh, fresh) = fresh_engine(&harness, &branches);
    assert_same_state(&workload, &engine, &fresh);
}

#[test]
fn test_reorg_deeper_than_history_forces_full_reparse() {
    let config = workload_config();
    let workload = Workload::generate(config.clone(), 29);
    let harness = Harness::new(EngineConfig {
        max_state_history: 3,
        ..Default::default()
    })
    .unwrap();
    harness.load(&workload);
    let (mut engine, _) = harness.start().unwrap();
    assert!(harness.checkpoints().unwrap().list().unwrap().len() <= 4);
    harness.observer.clear();

    harness.disconnect(&mut engine, 6);
    let mut branches: Vec<(u64, Vec<Transaction>)> =
        workload.blocks[..19].iter().map(|b| (0, b.clone())).collect();
    for seed in 0..7 {
        let txs = workload.extra_block(&config, 700 + seed, 2);
        harness.connect(&mut engine, 2, txs.clone()).unwrap();
        branches.push((2, txs));
    }

    assert!(matches!(
        harness.observer.recoveries().as_slice(),
        [RecoveryOutcome::FullReparse { .. }]
    ));
    assert_eq!(engine.watermark(), Some(BlockHeight(25)));

    let (_fresh, fresh) = fresh_engine(&harness, &branches);
    assert_same_state(&workload, &engine, &fresh);
}

/// Several disconnections before the next block are handled as one reorg.
#[test]
fn test_disconnections_accumulate_until_next_block() {
    let config = workload_config();
    let workload = Workload::generate(config.clone(), 31);
    let harness = Harness::new(EngineConfig::default()).unwrap();
    harness.load(&workload);
    let (mut engine, _) = harness.start().unwrap();
    harness.observer.clear();

    harness.disconnect(&mut engine, 1);
    harness.disconnect(&mut engine, 1);
    assert_eq!(
        engine.reorg_state(),
        ReorgState::Disconnecting {
            max_height: BlockHeight(24)
        }
    );

    let txs = workload.extra_block(&config, 3100, 2);
    harness.connect(&mut engine, 1, txs.clone()).unwrap();
    assert_eq!(
        harness.observer.recoveries(),
        vec![RecoveryOutcome::Restored {
            height: BlockHeight(22)
        }]
    );

    let mut branches: Vec<(u64, Vec<Transaction>)> =
        workload.blocks[..23].iter().map(|b| (0, b.clone())).collect();
    branches.push((1, txs));
    let (_fresh, fresh) = fresh_engine(&harness, &branches);
    assert_same_state(&workload, &engine, &fresh);
}
