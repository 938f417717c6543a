//! Scan orchestration and reorg recovery for the tallyscan secondary ledger.
//!
//! # Architecture
//!
//! ```text
//! ChainSource ──► Engine ──► Classifier ──► Interpreter (LedgerContext)
//!                   │                            │
//!                   │                            ▼
//!                   │              TallyLedger, FreezeState, PropertyRegistry
//!                   ▼
//!        TxIndex, CheckpointStore, watermark ──► EngineObserver
//! ```
//!
//! # Components
//!
//! - [`Engine`]: owns all derived state, processes blocks and recovers from
//!   reorganizations
//! - [`SharedEngine`]: `RwLock` handle for concurrent readers
//! - [`ChainSource`]: the base chain the engine reads
//! - [`Interpreter`]: downstream business logic, fed one [`Intent`] at a time
//! - [`EngineObserver`]: notifications for wallets, metrics and UIs
//! - [`ReorgController`]: disconnect bookkeeping until recovery runs
//! - [`ProgressReporter`]: time-bounded scan progress
//!
//! [`Intent`]: tallyscan_types::Intent

mod chain;
mod config;
mod engine;
mod error;
mod interpreter;
mod observer;
mod progress;
mod reorg;
mod shared;

pub mod consensus;

pub use chain::ChainSource;
pub use config::{ConsensusCheckpoint, EngineConfig};
pub use engine::{Engine, InitReport, ScanReport};
pub use error::EngineError;
pub use interpreter::{InterpretResult, Interpretation, Interpreter, LedgerContext};
pub use observer::{
    format_remaining, BlockOutcome, EngineObserver, NoopObserver, Progress, RecoveryOutcome,
};
pub use progress::ProgressReporter;
pub use reorg::{ReorgController, ReorgState};
pub use shared::SharedEngine;
