//! Freeze rule state.
//!
//! Two unversioned sets: properties for which freezing is enabled (with the
//! height it becomes live) and (address, property) pairs that are frozen.
//!
//! # Rollback hazard
//!
//! Neither set records *when* a pair was added or removed, so a freeze
//! transaction cannot be un-applied block by block. A reorg that crosses
//! any freeze-related transaction must rebuild all derived state from
//! scratch; the engine checks for that before attempting an incremental
//! rollback.

mod state;

pub use state::{FreezeError, FreezeState};
