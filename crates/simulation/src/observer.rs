//! Observer that records every engine notification.

use parking_lot::Mutex;
use tallyscan_classifier::Rejection;
use tallyscan_engine::{BlockOutcome, EngineObserver, Interpretation, Progress, RecoveryOutcome};
use tallyscan_types::{BlockHeader, BlockHeight, Hash, Intent};

#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    BlockConnected(BlockHeight),
    Classified { txid: Hash, result: i32 },
    Rejected { txid: Hash, code: i32 },
    BlockFinalized(BlockOutcome),
    CheckpointWritten(BlockHeight),
    StateInvalidated,
    Progress(Progress),
    Recovery(RecoveryOutcome),
    ShutdownRequested(String),
}

/// Thread-safe event log.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn count(&self, matches: impl Fn(&ObservedEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| matches(e)).count()
    }

    pub fn recoveries(&self) -> Vec<RecoveryOutcome> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::Recovery(outcome) => Some(outcome.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn checkpoints_written(&self) -> Vec<BlockHeight> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::CheckpointWritten(h) => Some(*h),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ObservedEvent) {
        self.events.lock().push(event);
    }
}

impl EngineObserver for RecordingObserver {
    fn on_block_connected(&self, header: &BlockHeader) {
        self.push(ObservedEvent::BlockConnected(header.height));
    }

    fn on_transaction_classified(&self, intent: &Intent, interpretation: &Interpretation) {
        self.push(ObservedEvent::Classified {
            txid: intent.txid,
            result: interpretation.result.code(),
        });
    }

    fn on_transaction_rejected(&self, txid: &Hash, rejection: &Rejection) {
        self.push(ObservedEvent::Rejected {
            txid: *txid,
            code: rejection.code(),
        });
    }

    fn on_block_finalized(&self, _header: &BlockHeader, outcome: &BlockOutcome) {
        self.push(ObservedEvent::BlockFinalized(outcome.clone()));
    }

    fn on_checkpoint_written(&self, height: BlockHeight, _block_hash: &Hash) {
        self.push(ObservedEvent::CheckpointWritten(height));
    }

    fn on_state_invalidated(&self) {
        self.push(ObservedEvent::StateInvalidated);
    }

    fn on_progress(&self, progress: &Progress) {
        self.push(ObservedEvent::Progress(*progress));
    }

    fn on_recovery(&self, outcome: &RecoveryOutcome) {
        self.push(ObservedEvent::Recovery(outcome.clone()));
    }

    fn on_shutdown_requested(&self, reason: &str) {
        self.push(ObservedEvent::ShutdownRequested(reason.to_string()));
    }
}
