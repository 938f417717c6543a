//! Scan runner: the engine's startup scan on a blocking task, with
//! cooperative shutdown.

use crate::chain_file::FileChain;
use crate::metrics;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tallyscan_engine::{
    Engine, EngineConfig, EngineError, EngineObserver, InitReport, Interpreter, SharedEngine,
};
use tallyscan_storage::{CheckpointError, CheckpointStore, KeyValueStore};
use tallyscan_types::{BlockHeight, Hash};
use thiserror::Error;
use tracing::{info, warn};

/// Errors from the scan runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Missing required builder field: {0}")]
    MissingField(&'static str),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Checkpoint directory error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("Scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handle for stopping a running scan at the next block boundary.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What a finished run left behind.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub init: InitReport,
    pub watermark: Option<BlockHeight>,
    pub consensus_hash: Hash,
}

/// Builder for constructing a [`ScanRunner`].
///
/// Required fields:
/// - `chain` - the block source
/// - `store` - key-value backend for the index and registry
/// - `checkpoint_dir` - directory for checkpoint files
/// - `interpreter` - downstream business logic
///
/// Optional fields:
/// - `config` - engine configuration (defaults to [`EngineConfig::default`])
/// - `observer` - notifications (defaults to [`metrics::MetricsObserver`])
#[derive(Default)]
pub struct ScanRunnerBuilder {
    config: Option<EngineConfig>,
    chain: Option<Arc<FileChain>>,
    store: Option<Arc<dyn KeyValueStore>>,
    checkpoint_dir: Option<PathBuf>,
    interpreter: Option<Box<dyn Interpreter>>,
    observer: Option<Arc<dyn EngineObserver>>,
}

impl ScanRunnerBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn chain(mut self, chain: Arc<FileChain>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn interpreter(mut self, interpreter: Box<dyn Interpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<ScanRunner, RunnerError> {
        let chain = self.chain.ok_or(RunnerError::MissingField("chain"))?;
        let store = self.store.ok_or(RunnerError::MissingField("store"))?;
        let dir = self
            .checkpoint_dir
            .ok_or(RunnerError::MissingField("checkpoint_dir"))?;
        let interpreter = self
            .interpreter
            .ok_or(RunnerError::MissingField("interpreter"))?;
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(metrics::MetricsObserver::new()));

        let shutdown = ShutdownHandle {
            flag: chain.shutdown_flag(),
        };
        let engine = Engine::new(
            self.config.unwrap_or_default(),
            chain,
            store,
            CheckpointStore::open(dir)?,
            interpreter,
            observer,
        );
        Ok(ScanRunner {
            engine: SharedEngine::new(engine),
            shutdown,
        })
    }
}

/// Owns the engine for one process lifetime.
#[derive(Debug)]
pub struct ScanRunner {
    engine: SharedEngine,
    shutdown: ShutdownHandle,
}

impl ScanRunner {
    pub fn builder() -> ScanRunnerBuilder {
        ScanRunnerBuilder::default()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }

    /// Run `Engine::init` on the blocking pool. Ctrl-C stops the scan at
    /// the next block boundary; the state reached so far is kept.
    pub async fn run(self) -> Result<RunSummary, RunnerError> {
        let shutdown = self.shutdown.clone();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current block");
                shutdown.shutdown();
            }
        });

        let engine = self.engine.clone();
        let result = tokio::task::spawn_blocking(move || engine.write().init()).await;
        signal_task.abort();

        let init = result??;
        let (watermark, consensus_hash) = {
            let engine = self.engine.read();
            (engine.watermark(), engine.consensus_hash())
        };
        metrics::set_watermark(watermark);

        if init.scan.stopped_early {
            info!(?watermark, "Scan interrupted");
        }
        info!(?watermark, %consensus_hash, "Scan finished");
        Ok(RunSummary {
            init,
            watermark,
            consensus_hash,
        })
    }
}
