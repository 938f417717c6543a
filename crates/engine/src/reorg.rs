//! Reorg recovery state machine.
//!
//! ```text
//! Normal ──disconnect──► Disconnecting{max} ──next block begin──► Recovering ──► Normal
//!                          ▲            │
//!                          └─disconnect─┘ (max grows)
//! ```
//!
//! Disconnections only record the highest disconnected height. The actual
//! rollback runs when the next block arrives, once the whole disconnected
//! range is known.

use tallyscan_types::BlockHeight;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorgState {
    Normal,
    Disconnecting { max_height: BlockHeight },
    Recovering { from: BlockHeight, max_height: BlockHeight },
}

/// Tracks pending disconnections until the engine recovers.
#[derive(Debug, Clone)]
pub struct ReorgController {
    state: ReorgState,
}

impl Default for ReorgController {
    fn default() -> Self {
        Self::new()
    }
}

impl ReorgController {
    pub fn new() -> Self {
        Self {
            state: ReorgState::Normal,
        }
    }

    pub fn state(&self) -> ReorgState {
        self.state
    }

    pub fn is_normal(&self) -> bool {
        self.state == ReorgState::Normal
    }

    /// Record the disconnection of the block at `height`.
    pub fn on_disconnect(&mut self, height: BlockHeight) {
        let max_height = match self.state {
            ReorgState::Disconnecting { max_height } => max_height.max(height),
            _ => height,
        };
        debug!(%height, %max_height, "Block disconnected");
        self.state = ReorgState::Disconnecting { max_height };
    }

    /// Enter recovery if disconnections are pending. Returns the affected
    /// range `[first reconnected height, max disconnected height]`.
    pub fn begin_recovery(&mut self, height: BlockHeight) -> Option<(BlockHeight, BlockHeight)> {
        let ReorgState::Disconnecting { max_height } = self.state else {
            return None;
        };
        self.state = ReorgState::Recovering {
            from: height,
            max_height,
        };
        Some((height, max_height))
    }

    pub fn finish_recovery(&mut self) {
        self.state = ReorgState::Normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnects_accumulate_max_height() {
        let mut controller = ReorgController::new();
        assert_eq!(controller.begin_recovery(BlockHeight(5)), None);

        controller.on_disconnect(BlockHeight(10));
        controller.on_disconnect(BlockHeight(9));
        assert_eq!(
            controller.state(),
            ReorgState::Disconnecting {
                max_height: BlockHeight(10)
            }
        );

        assert_eq!(
            controller.begin_recovery(BlockHeight(9)),
            Some((BlockHeight(9), BlockHeight(10)))
        );
        assert!(!controller.is_normal());
        controller.finish_recovery();
        assert!(controller.is_normal());
    }
}
