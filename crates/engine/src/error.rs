//! Engine errors.

use tallyscan_classifier::Rejection;
use tallyscan_storage::{CheckpointError, StorageError};
use tallyscan_types::{BlockHeight, Hash, OutPoint};
use thiserror::Error;

/// Failures that escape block processing or recovery.
///
/// Ordinary classification rejections never show up here. They are
/// outcomes of a single transaction, reported through the observer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A previous output could not be fetched. The block was not applied.
    #[error("input {} of transaction {txid} at height {height} is unavailable", outpoint_label(.outpoint))]
    InputUnavailable {
        txid: Hash,
        height: BlockHeight,
        outpoint: OutPoint,
    },

    #[error("checkpoint for block {block_hash} is corrupt: {source}")]
    CorruptCheckpoint {
        block_hash: Hash,
        #[source]
        source: CheckpointError,
    },

    /// No usable state could be restored; a full reparse is required.
    #[error("unrecoverable reorg: {0}")]
    UnrecoverableReorg(String),

    #[error(
        "published checkpoint mismatch at height {height}: \
         expected block {expected_block} with state {expected_state}, \
         got block {actual_block} with state {actual_state}"
    )]
    CheckpointMismatch {
        height: BlockHeight,
        expected_block: Hash,
        expected_state: Hash,
        actual_block: Hash,
        actual_state: Hash,
    },

    /// The engine stopped after a fatal failure and accepts no more blocks.
    #[error("engine halted")]
    Halted,

    #[error("freeze state replay failed for {txid}: {reason}")]
    FreezeReplay { txid: Hash, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

fn outpoint_label(outpoint: &OutPoint) -> String {
    format!("{}:{}", outpoint.txid, outpoint.vout)
}

impl EngineError {
    pub(crate) fn input_unavailable(txid: Hash, height: BlockHeight, rejection: &Rejection) -> Self {
        let outpoint = match rejection {
            Rejection::MissingInputs(outpoint) => *outpoint,
            _ => OutPoint::null(),
        };
        EngineError::InputUnavailable {
            txid,
            height,
            outpoint,
        }
    }

    /// Whether the caller should fall back to a full reparse.
    pub fn requires_reparse(&self) -> bool {
        matches!(
            self,
            EngineError::CorruptCheckpoint { .. } | EngineError::UnrecoverableReorg(_)
        )
    }
}
