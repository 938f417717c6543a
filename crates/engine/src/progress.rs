//! Time-bounded scan progress reporting.

use crate::Progress;
use std::time::{Duration, Instant};
use tallyscan_types::BlockHeader;

const DEFAULT_REMAINING: Duration = Duration::from_secs(3600);

/// Estimates scan progress from the share of chain transactions processed
/// and reports at most once per interval.
#[derive(Debug)]
pub struct ProgressReporter {
    first_chain_tx: u64,
    last_chain_tx: u64,
    last: BlockHeader,
    interval: Duration,
    started: Instant,
    last_report: Instant,
}

impl ProgressReporter {
    pub fn new(first: &BlockHeader, last: &BlockHeader, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            first_chain_tx: first.chain_tx,
            last_chain_tx: last.chain_tx,
            last: last.clone(),
            interval,
            started: now,
            last_report: now,
        }
    }

    /// Progress at `current`, if a report is due.
    pub fn tick(&mut self, current: &BlockHeader) -> Option<Progress> {
        let now = Instant::now();
        if now.duration_since(self.last_report) < self.interval {
            return None;
        }
        self.last_report = now;
        Some(self.estimate(current, now.duration_since(self.started)))
    }

    /// Linear extrapolation from `elapsed` and the fraction of transactions
    /// processed.
    pub fn estimate(&self, current: &BlockHeader, elapsed: Duration) -> Progress {
        let span = self.last_chain_tx.saturating_sub(self.first_chain_tx);
        let done = current.chain_tx.saturating_sub(self.first_chain_tx);
        let percent = if span == 0 {
            100.0
        } else {
            (100.0 * done as f64 / span as f64).min(100.0)
        };

        let remaining = if percent > 0.0 && !elapsed.is_zero() {
            elapsed.mul_f64((100.0 - percent) / percent)
        } else {
            DEFAULT_REMAINING
        };

        Progress {
            height: current.height,
            last_height: self.last.height,
            percent,
            remaining,
        }
    }
}
