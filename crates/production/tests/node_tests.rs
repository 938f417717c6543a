//! End-to-end scans over a block file and a RocksDB index.

use std::path::Path;
use std::sync::Arc;
use tallyscan_engine::EngineConfig;
use tallyscan_production::{
    write_block_file, FileChain, RocksDbStore, RunSummary, ScanRunner, RunnerError,
};
use tallyscan_simulation::{Harness, ReferenceInterpreter, Workload, WorkloadConfig};
use tallyscan_types::{Block, BlockHeight};
use tempfile::TempDir;

fn workload_blocks(seed: u64, blocks: usize) -> Vec<Block> {
    let workload = Workload::generate(
        WorkloadConfig {
            blocks,
            freeze_probability: 0.3,
            ..Default::default()
        },
        seed,
    );
    let harness = Harness::new(EngineConfig::default()).unwrap();
    harness.load(&workload);
    harness.chain.blocks()
}

async fn run_node(data_dir: &Path, blocks: &[Block]) -> Result<RunSummary, RunnerError> {
    let chain = FileChain::from_blocks(blocks.to_vec()).unwrap();
    let store = RocksDbStore::open(data_dir.join("index")).unwrap();
    ScanRunner::builder()
        .chain(Arc::new(chain))
        .store(Arc::new(store))
        .checkpoint_dir(data_dir.join("checkpoints"))
        .interpreter(Box::new(ReferenceInterpreter::new()))
        .build()?
        .run()
        .await
}

#[tokio::test]
async fn test_file_scan_matches_in_memory_scan() {
    let blocks = workload_blocks(11, 25);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chain.jsonl");
    write_block_file(&path, &blocks).unwrap();

    let chain = FileChain::open(&path).unwrap();
    assert_eq!(chain.len(), blocks.len());

    let summary = run_node(dir.path(), &blocks).await.unwrap();
    assert_eq!(summary.watermark, Some(BlockHeight(24)));
    assert!(summary.init.restored.is_none());

    let reference = Harness::new(EngineConfig::default()).unwrap();
    for block in &blocks {
        reference.chain.push_block(0, block.transactions.clone());
    }
    let (engine, _) = reference.start().unwrap();
    assert_eq!(summary.consensus_hash, engine.consensus_hash());
}

#[tokio::test]
async fn test_restart_resumes_from_checkpoint() {
    let blocks = workload_blocks(12, 30);
    let dir = TempDir::new().unwrap();

    let first = run_node(dir.path(), &blocks[..20]).await.unwrap();
    assert_eq!(first.watermark, Some(BlockHeight(19)));

    let second = run_node(dir.path(), &blocks).await.unwrap();
    assert_eq!(second.init.restored, Some(BlockHeight(19)));
    assert_eq!(second.init.scan.blocks, 10);
    assert_eq!(second.watermark, Some(BlockHeight(29)));

    let clean = TempDir::new().unwrap();
    let fresh = run_node(clean.path(), &blocks).await.unwrap();
    assert_eq!(second.consensus_hash, fresh.consensus_hash);
}

#[test]
fn test_builder_requires_chain() {
    let err = ScanRunner::builder()
        .interpreter(Box::new(ReferenceInterpreter::new()))
        .build()
        .unwrap_err();
    assert!(matches!(err, RunnerError::MissingField("chain")));
}
