//! Production plumbing for the tallyscan engine.
//!
//! - [`RocksDbStore`]: persistent key-value backend for the transaction
//!   index and property registry
//! - [`FileChain`]: block source reading a JSON-lines block file
//! - [`ScanRunner`]: runs the startup scan on the blocking pool with
//!   Ctrl-C shutdown
//! - [`metrics`]: Prometheus metrics and an engine observer feeding them
//! - [`telemetry`]: tracing subscriber setup

mod chain_file;
pub mod metrics;
mod runner;
mod storage;
pub mod telemetry;

pub use chain_file::{write_block_file, ChainFileError, FileChain};
pub use metrics::MetricsObserver;
pub use runner::{RunSummary, RunnerError, ScanRunner, ScanRunnerBuilder, ShutdownHandle};
pub use storage::{CompressionType, RocksDbConfig, RocksDbStore};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
