//! Tally ledger for the tallyscan engine.
//!
//! Pure data structures, no I/O:
//!
//! - [`Tally`]: balances of one address, one counter set per property
//! - [`TallyLedger`]: every address's tally
//! - [`PendingRegistry`]: reservations made by unconfirmed transfers
//! - [`projection`]: read-only summaries recomputed on demand

mod ledger;
mod pending;
mod tally;

pub mod projection;

pub use ledger::TallyLedger;
pub use pending::{PendingEntry, PendingRegistry};
pub use tally::{Tally, TallyKind};
