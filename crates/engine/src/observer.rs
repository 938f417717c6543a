//! Notifications from the engine to wallets, metrics and UIs.

use crate::Interpretation;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tallyscan_classifier::Rejection;
use tallyscan_types::{BlockHeader, BlockHeight, Hash, Intent};

/// Summary of one processed block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockOutcome {
    pub height: BlockHeight,
    pub block_hash: Hash,
    /// Transactions in the block.
    pub transactions: usize,
    /// Intents handed to the interpreter.
    pub classified: usize,
    /// Intents the interpreter accepted.
    pub valid: usize,
    /// Transactions without an intent.
    pub rejected: usize,
    pub checkpoint_written: bool,
    /// The block was at or below the watermark and had no effect.
    pub skipped: bool,
}

/// A scan progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub height: BlockHeight,
    pub last_height: BlockHeight,
    /// Percentage of chain transactions processed, 0 to 100.
    pub percent: f64,
    pub remaining: Duration,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Still scanning.. at block {} of {}. Progress: {:.2} %, about {} remaining..",
            self.height,
            self.last_height,
            self.percent,
            format_remaining(self.remaining)
        )
    }
}

/// Human readable time span: `h:mm:ss hours`, `m:ss minutes` or
/// `s seconds`.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02} hours")
    } else if minutes > 0 {
        format!("{minutes}:{seconds:02} minutes")
    } else {
        format!("{seconds} seconds")
    }
}

/// How a reorg or startup load was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// State was restored from the checkpoint at `height`.
    Restored { height: BlockHeight },
    /// All derived state was cleared; scanning restarts from genesis.
    FullReparse { reason: String },
}

impl RecoveryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RecoveryOutcome::Restored { .. } => "restored",
            RecoveryOutcome::FullReparse { .. } => "full_reparse",
        }
    }
}

/// Receives engine events. Every method defaults to a no-op.
pub trait EngineObserver: Send + Sync {
    fn on_block_connected(&self, _header: &BlockHeader) {}

    fn on_transaction_classified(&self, _intent: &Intent, _interpretation: &Interpretation) {}

    fn on_transaction_rejected(&self, _txid: &Hash, _rejection: &Rejection) {}

    fn on_block_finalized(&self, _header: &BlockHeader, _outcome: &BlockOutcome) {}

    fn on_checkpoint_written(&self, _height: BlockHeight, _block_hash: &Hash) {}

    /// Derived state was replaced; cached views must be rebuilt.
    fn on_state_invalidated(&self) {}

    fn on_progress(&self, _progress: &Progress) {}

    fn on_recovery(&self, _outcome: &RecoveryOutcome) {}

    fn on_shutdown_requested(&self, _reason: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {}

impl<T: EngineObserver + ?Sized> EngineObserver for Arc<T> {
    fn on_block_connected(&self, header: &BlockHeader) {
        (**self).on_block_connected(header)
    }

    fn on_transaction_classified(&self, intent: &Intent, interpretation: &Interpretation) {
        (**self).on_transaction_classified(intent, interpretation)
    }

    fn on_transaction_rejected(&self, txid: &Hash, rejection: &Rejection) {
        (**self).on_transaction_rejected(txid, rejection)
    }

    fn on_block_finalized(&self, header: &BlockHeader, outcome: &BlockOutcome) {
        (**self).on_block_finalized(header, outcome)
    }

    fn on_checkpoint_written(&self, height: BlockHeight, block_hash: &Hash) {
        (**self).on_checkpoint_written(height, block_hash)
    }

    fn on_state_invalidated(&self) {
        (**self).on_state_invalidated()
    }

    fn on_progress(&self, progress: &Progress) {
        (**self).on_progress(progress)
    }

    fn on_recovery(&self, outcome: &RecoveryOutcome) {
        (**self).on_recovery(outcome)
    }

    fn on_shutdown_requested(&self, reason: &str) {
        (**self).on_shutdown_requested(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_formats() {
        assert_eq!(format_remaining(Duration::from_secs(42)), "42 seconds");
        assert_eq!(format_remaining(Duration::from_secs(125)), "2:05 minutes");
        assert_eq!(format_remaining(Duration::from_secs(3600 + 61)), "1:01:01 hours");
    }

    #[test]
    fn test_progress_message() {
        let progress = Progress {
            height: BlockHeight(500),
            last_height: BlockHeight(1000),
            percent: 37.5,
            remaining: Duration::from_secs(90),
        };
        assert_eq!(
            progress.to_string(),
            "Still scanning.. at block 500 of 1000. Progress: 37.50 %, about 1:30 minutes remaining.."
        );
    }
}
