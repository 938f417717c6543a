//! Restart and crash recovery.
//!
//! An engine is dropped and rebuilt over the same key-value store and
//! checkpoint directory. The rebuilt engine must reach the state of one
//! that never stopped.

use std::fs;
use tallyscan_engine::{EngineConfig, RecoveryOutcome};
use tallyscan_simulation::{Harness, Workload, WorkloadConfig};
use tallyscan_storage::{CheckpointKind, TxIndex, DB_VERSION};
use tallyscan_types::BlockHeight;
use tracing_test::traced_test;

fn workload(seed: u64) -> Workload {
    Workload::generate(
        WorkloadConfig {
            blocks: 30,
            freeze_probability: 0.5,
            ..Default::default()
        },
        seed,
    )
}

/// Consensus hash of an engine that scanned `workload` without stopping.
fn uninterrupted(workload: &Workload) -> tallyscan_types::Hash {
    let harness = Harness::new(EngineConfig::default()).unwrap();
    harness.load(workload);
    let (engine, _) = harness.start().unwrap();
    engine.consensus_hash()
}

#[test]
fn test_restart_restores_latest_checkpoint() {
    let workload = workload(3);
    let harness = Harness::new(EngineConfig::default()).unwrap();
    for txs in &workload.blocks[..20] {
        harness.chain.push_block(0, txs.clone());
    }
    let (engine, _) = harness.start().unwrap();
    assert_eq!(engine.watermark(), Some(BlockHeight(19)));
    drop(engine);

    for txs in &workload.blocks[20..] {
        harness.chain.push_block(0, txs.clone());
    }
    let (engine, report) = harness.start().unwrap();

    assert_eq!(report.restored, Some(BlockHeight(19)));
    assert_eq!(report.scan.blocks, 10);
    assert_eq!(engine.watermark(), Some(BlockHeight(29)));
    assert_eq!(engine.consensus_hash(), uninterrupted(&workload));
}

/// Freeze state is not checkpointed; it is rebuilt from the index.
#[test]
fn test_restart_rebuilds_freeze_state() {
    let workload = workload(11);
    let harness = Harness::new(EngineConfig::default()).unwrap();
    harness.load(&workload);

    let (engine, _) = harness.start().unwrap();
    let before = engine.freeze_state().clone();
    assert!(!before.is_empty());
    drop(engine);

    let (engine, report) = harness.start().unwrap();
    assert!(report.freeze_replayed > 0);
    assert_eq!(report.scan.blocks, 0);
    assert_eq!(engine.freeze_state(), &before);
}

#[traced_test]
#[test]
fn test_tampered_checkpoint_falls_back_to_older_one() {
    let workload = workload(5);
    let harness = Harness::new(EngineConfig::default()).unwrap();
    harness.load(&workload);
    let (engine, _) = harness.start().unwrap();
    let expected = engine.consensus_hash();
    drop(engine);

    let tip = harness.chain.tip().unwrap();
    let path = harness
        .checkpoints()
        .unwrap()
        .path(CheckpointKind::Globals, &tip.hash);
    let content = fs::read_to_string(&path).unwrap();
    fs::write(&path, content.replacen(",", ",9", 1)).unwrap();

    let (engine, report) = harness.start().unwrap();
    assert_eq!(report.restored, Some(BlockHeight(28)));
    assert_eq!(report.scan.blocks, 1);
    assert_eq!(engine.consensus_hash(), expected);
    assert!(logs_contain("Discarding unusable checkpoint"));
}

#[test]
fn test_start_clean_reparses_everything() {
    let workload = workload(8);
    let mut harness = Harness::new(EngineConfig::default()).unwrap();
    harness.load(&workload);
    let (engine, _) = harness.start().unwrap();
    let expected = engine.consensus_hash();
    drop(engine);

    harness.config.start_clean = true;
    harness.observer.clear();
    let (engine, report) = harness.start().unwrap();

    assert_eq!(report.restored, None);
    assert_eq!(report.reparse_reason.as_deref(), Some("start clean requested"));
    assert_eq!(report.scan.blocks, workload.blocks.len());
    assert_eq!(engine.consensus_hash(), expected);
    assert!(matches!(
        harness.observer.recoveries().as_slice(),
        [RecoveryOutcome::FullReparse { .. }]
    ));
}

#[test]
fn test_index_version_change_forces_reparse() {
    let workload = workload(9);
    let harness = Harness::new(EngineConfig::default()).unwrap();
    harness.load(&workload);
    let (engine, _) = harness.start().unwrap();
    let expected = engine.consensus_hash();
    drop(engine);

    TxIndex::new(harness.store.clone())
        .set_db_version(DB_VERSION + 1)
        .unwrap();

    let (engine, report) = harness.start().unwrap();
    assert_eq!(report.restored, None);
    assert_eq!(
        report.reparse_reason.as_deref(),
        Some("index schema version changed")
    );
    assert_eq!(engine.tx_index().db_version().unwrap(), Some(DB_VERSION));
    assert_eq!(engine.consensus_hash(), expected);
}

/// With every checkpoint gone the engine starts over from genesis.
#[test]
fn test_missing_checkpoints_force_reparse() {
    let workload = workload(10);
    let harness = Harness::new(EngineConfig::default()).unwrap();
    harness.load(&workload);
    let (engine, _) = harness.start().unwrap();
    let expected = engine.consensus_hash();
    drop(engine);

    harness.checkpoints().unwrap().wipe().unwrap();
    let (engine, report) = harness.start().unwrap();

    assert_eq!(report.restored, None);
    assert!(report
        .reparse_reason
        .unwrap()
        .starts_with("no usable previous state found"));
    assert_eq!(engine.consensus_hash(), expected);
}
