//! The engine context.
//!
//! [`Engine`] owns every piece of derived state (tally ledger, pending
//! reservations, freeze sets, property registry, transaction index,
//! checkpoint files and the watermark) and drives the pipeline:
//!
//! ```text
//! block ─► classify every tx ─► interpret in order ─► index ─► block end
//!                                                                │
//!                          consensus hash, published checkpoint ◄┤
//!                          checkpoint write + prune, watermark  ◄┘
//! ```
//!
//! Disconnections are only recorded. Recovery runs when the next block
//! arrives: either the nearest valid checkpoint is restored, or all derived
//! state is cleared and the chain is rescanned from the genesis height.

use crate::consensus::{self, CheckpointVerdict};
use crate::{
    BlockOutcome, ChainSource, EngineConfig, EngineError, EngineObserver, InterpretResult,
    Interpretation, Interpreter, LedgerContext, ProgressReporter, RecoveryOutcome,
    ReorgController, ReorgState,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tallyscan_classifier::{BlockContext, CacheStats, Classifier, Rejection};
use tallyscan_freeze::FreezeState;
use tallyscan_ledger::projection::{self, TokenTotals, WalletSummary};
use tallyscan_ledger::{PendingRegistry, TallyKind, TallyLedger};
use tallyscan_storage::{
    CheckpointStore, GlobalCounters, KeyValueStore, PropertyRegistry, TxIndex, TxOutcome,
    TxRecord, DB_VERSION,
};
use tallyscan_types::{
    tx_type, Address, Block, BlockHeader, BlockHeight, Ecosystem, Hash, Intent, PropertyId,
    Transaction,
};
use tracing::{debug, error, info, instrument, trace, warn};

/// Result of [`Engine::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// Height of the checkpoint state was restored from.
    pub restored: Option<BlockHeight>,
    /// Why no state was restored, if none was.
    pub reparse_reason: Option<String>,
    /// Freeze transactions replayed from the index.
    pub freeze_replayed: usize,
    pub scan: ScanReport,
}

/// Result of a scan over a height range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub first: BlockHeight,
    pub last: BlockHeight,
    pub last_processed: Option<BlockHeight>,
    pub blocks: usize,
    pub transactions: usize,
    /// Transactions the interpreter accepted.
    pub meta_transactions: usize,
    /// Stopped before `last` (shutdown request or missing block).
    pub stopped_early: bool,
}

/// Derived state mutated by blocks.
struct DerivedState {
    ledger: TallyLedger,
    pending: PendingRegistry,
    freeze: FreezeState,
    registry: PropertyRegistry,
    legacy_counter: u64,
}

impl DerivedState {
    fn context(&mut self, height: BlockHeight, block_hash: Hash) -> LedgerContext<'_> {
        LedgerContext::new(
            &mut self.ledger,
            &mut self.freeze,
            &mut self.registry,
            &mut self.legacy_counter,
            height,
            block_hash,
        )
    }

    fn globals(&self) -> GlobalCounters {
        GlobalCounters {
            legacy_counter: self.legacy_counter,
            next_main: self.registry.peek_next(Ecosystem::Main),
            next_test: self.registry.peek_next(Ecosystem::Test),
        }
    }
}

/// Secondary-ledger engine. One instance per data directory; all mutation
/// goes through `&mut self`.
pub struct Engine {
    config: EngineConfig,
    chain: Arc<dyn ChainSource>,
    interpreter: Box<dyn Interpreter>,
    observer: Arc<dyn EngineObserver>,
    classifier: Classifier,
    state: DerivedState,
    tx_index: TxIndex,
    checkpoints: CheckpointStore,
    /// Height of the last block whose effects are applied.
    watermark: Option<BlockHeight>,
    reorg: ReorgController,
    halted: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("watermark", &self.watermark)
            .field("addresses", &self.state.ledger.len())
            .field("pending", &self.state.pending.len())
            .field("reorg", &self.reorg.state())
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        chain: Arc<dyn ChainSource>,
        store: Arc<dyn KeyValueStore>,
        checkpoints: CheckpointStore,
        interpreter: Box<dyn Interpreter>,
        observer: Arc<dyn EngineObserver>,
    ) -> Self {
        let classifier = Classifier::new(config.classifier.clone(), config.input_cache_capacity);
        Self {
            classifier,
            state: DerivedState {
                ledger: TallyLedger::new(),
                pending: PendingRegistry::new(),
                freeze: FreezeState::new(),
                registry: PropertyRegistry::new(store.clone()),
                legacy_counter: 0,
            },
            tx_index: TxIndex::new(store),
            checkpoints,
            watermark: None,
            reorg: ReorgController::new(),
            halted: false,
            config,
            chain,
            interpreter,
            observer,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Startup
    // ═══════════════════════════════════════════════════════════════════════

    /// Restore the most relevant persisted state, replay rule state from the
    /// index and scan to the chain tip.
    #[instrument(skip(self))]
    pub fn init(&mut self) -> Result<InitReport, EngineError> {
        info!(genesis = %self.config.genesis_height, "Initializing engine");

        if self.config.start_clean {
            let removed = self.checkpoints.wipe()?;
            self.tx_index.clear()?;
            self.state.registry.clear()?;
            self.tx_index.set_db_version(DB_VERSION)?;
            info!(removed, "Start clean: cleared checkpoint files and index");
        }
        let wrong_version = self.tx_index.db_version()? != Some(DB_VERSION);

        let loaded = self.load_most_relevant_state();
        let (restored, reparse_reason) = match loaded {
            Ok(_) if wrong_version => (None, Some("index schema version changed".to_string())),
            Ok(height) => (Some(height), None),
            Err(_) if self.config.start_clean => (None, Some("start clean requested".to_string())),
            Err(e) => (None, Some(format!("no usable previous state found: {e}"))),
        };

        match (restored, &reparse_reason) {
            (Some(height), _) => {
                info!(%height, "Loading persistent state: OK");
                self.watermark = Some(height);
                self.observer
                    .on_recovery(&RecoveryOutcome::Restored { height });
            }
            (None, reason) => {
                let reason = reason.clone().unwrap_or_default();
                info!(%reason, "Loading persistent state: NONE");
                self.clear_all_state()?;
                self.observer
                    .on_recovery(&RecoveryOutcome::FullReparse { reason });
            }
        }

        if self.watermark < self.floor() {
            self.watermark = self.floor();
            self.state.legacy_counter = 0;
        }

        let freeze_replayed = self.replay_rule_state()?;
        let scan = self.scan(self.next_height())?;

        info!(
            watermark = ?self.watermark,
            addresses = self.state.ledger.len(),
            "Engine initialization completed"
        );
        Ok(InitReport {
            restored,
            reparse_reason,
            freeze_replayed,
            scan,
        })
    }

    /// Watermark value meaning "nothing below genesis is applied".
    fn floor(&self) -> Option<BlockHeight> {
        self.config.genesis_height.prev()
    }

    /// First height not yet applied.
    fn next_height(&self) -> BlockHeight {
        self.watermark
            .map_or(self.config.genesis_height, BlockHeight::next)
            .max(self.config.genesis_height)
    }

    /// Replay freeze, activation and alert records up to the watermark.
    ///
    /// Freeze state is not checkpointed, so it is rebuilt here. A failed
    /// freeze replay halts the engine unless the override is set.
    fn replay_rule_state(&mut self) -> Result<usize, EngineError> {
        let Some(up_to) = self.watermark else {
            return Ok(0);
        };

        let mut replayed = 0;
        for indexed in self.tx_index.valid_of_types(&tx_type::FREEZE_TYPES, up_to)? {
            match self.replay_one(&indexed.txid, indexed.record.height, indexed.position) {
                Ok(()) => replayed += 1,
                Err(e) => {
                    error!(error = %e, "Failed to load freeze state. It is unsafe to continue");
                    if !self.config.override_forced_shutdown {
                        self.halt(&e);
                        return Err(e);
                    }
                }
            }
        }

        let rule_types = [tx_type::ACTIVATION, tx_type::ALERT];
        for indexed in self.tx_index.valid_of_types(&rule_types, up_to)? {
            if let Err(e) = self.replay_one(&indexed.txid, indexed.record.height, indexed.position) {
                warn!(error = %e, "Failed to replay rule record");
            }
        }

        if replayed > 0 {
            info!(replayed, %up_to, "Freeze state restored from index");
        }
        Ok(replayed)
    }

    fn replay_one(&mut self, txid: &Hash, height: BlockHeight, position: u32) -> Result<(), EngineError> {
        let replay_error = |reason: String| EngineError::FreezeReplay {
            txid: *txid,
            reason,
        };

        let (tx, block_hash) = self
            .chain
            .fetch_transaction(txid)
            .ok_or_else(|| replay_error("transaction not found".into()))?;
        let header = self
            .chain
            .header(&block_hash)
            .ok_or_else(|| replay_error(format!("block {block_hash} not found")))?;

        let ctx = BlockContext {
            height,
            time: header.time,
            index: position,
        };
        let intent = self
            .classifier
            .classify(&tx, ctx, &*self.chain)
            .map_err(|r| replay_error(r.to_string()))?;

        let interpretation = self
            .interpreter
            .interpret(&intent, &mut self.state.context(height, block_hash));
        if !interpretation.result.is_valid() {
            return Err(replay_error(format!(
                "interpreter returned {}",
                interpretation.result.code()
            )));
        }
        trace!(%txid, %height, tx_type = tx_type::name(interpretation.tx_type), "Rule record replayed");
        Ok(())
    }

    /// Restore the newest valid checkpoint on the active chain, walking
    /// back from the persisted watermark by at most `max_state_history + 1`
    /// blocks. Returns the restored height.
    fn load_most_relevant_state(&mut self) -> Result<BlockHeight, EngineError> {
        let Some(watermark_hash) = self.state.registry.watermark()? else {
            return Err(EngineError::UnrecoverableReorg(
                "no watermark recorded".into(),
            ));
        };
        let Some(mut header) = self.chain.header(&watermark_hash) else {
            return Err(EngineError::UnrecoverableReorg(format!(
                "watermark {watermark_hash} is not a known block"
            )));
        };

        // Roll the registry back onto the active chain.
        while !self.chain.is_active(&header.hash) {
            self.state.registry.pop_block(&header.hash)?;
            header = self.chain.header(&header.prev_hash).ok_or_else(|| {
                EngineError::UnrecoverableReorg("stale branch has no known parent".into())
            })?;
            self.state.registry.set_watermark(&header.hash)?;
        }

        let persisted: BTreeSet<Hash> = self
            .checkpoints
            .list()?
            .into_iter()
            .filter(|hash| self.chain.is_active(hash))
            .collect();
        if persisted.is_empty() {
            return Err(EngineError::UnrecoverableReorg(
                "no checkpoint on the active chain".into(),
            ));
        }

        // Heights at or below `stop` are not searched.
        let stop = header
            .height
            .0
            .checked_sub(self.config.max_state_history + 1);
        let mut current = Some(header);
        while let Some(tip) = current.filter(|h| stop.map_or(true, |s| h.height.0 > s)) {
            if persisted.contains(&tip.hash) {
                match self.checkpoints.load(&tip.hash, true) {
                    Ok(checkpoint) => {
                        self.state.ledger = checkpoint.ledger;
                        self.state.pending.clear();
                        self.state.legacy_counter = checkpoint.globals.legacy_counter;
                        self.state
                            .registry
                            .init(checkpoint.globals.next_main, checkpoint.globals.next_test);
                        let dropped = self
                            .tx_index
                            .delete_range(tip.height.next(), BlockHeight(u64::MAX))?;
                        info!(height = %tip.height, block_hash = %tip.hash, dropped, "Checkpoint restored");
                        return Ok(tip.height);
                    }
                    Err(source) => {
                        let e = EngineError::CorruptCheckpoint {
                            block_hash: tip.hash,
                            source,
                        };
                        warn!(error = %e, "Discarding unusable checkpoint");
                    }
                }
            }

            self.state.registry.pop_block(&tip.hash)?;
            current = self.chain.header(&tip.prev_hash);
            if let Some(parent) = &current {
                self.state.registry.set_watermark(&parent.hash)?;
            }
        }

        Err(EngineError::UnrecoverableReorg(format!(
            "no valid checkpoint within {} blocks of the watermark",
            self.config.max_state_history + 1
        )))
    }

    /// Wipe all derived state, in memory and in the index.
    pub fn clear_all_state(&mut self) -> Result<(), EngineError> {
        self.state.ledger.clear();
        self.state.pending.clear();
        self.state.freeze.clear();
        self.state.legacy_counter = 0;
        self.interpreter.reset();
        self.state.registry.clear()?;
        self.tx_index.clear()?;
        self.tx_index.set_db_version(DB_VERSION)?;
        self.watermark = None;
        info!("Cleared all derived state");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Chain events
    // ═══════════════════════════════════════════════════════════════════════

    /// Apply a newly connected block.
    ///
    /// Pending disconnections are recovered first, and any gap between the
    /// watermark and the block is scanned.
    #[instrument(skip(self, block), fields(height = %block.height()))]
    pub fn on_block_connected(&mut self, block: &Block) -> Result<BlockOutcome, EngineError> {
        if self.halted {
            return Err(EngineError::Halted);
        }
        let height = block.height();

        if let Some((from, max_height)) = self.reorg.begin_recovery(height) {
            if let Err(e) = self.recover(from, max_height) {
                error!(error = %e, "Reorg recovery failed, derived state is inconsistent");
                self.halt(&e);
                return Err(e);
            }
        }

        if let Some(last) = height.prev() {
            let next = self.next_height();
            if next <= last {
                let report = self.scan_range(next, last)?;
                if report.stopped_early {
                    debug!(%height, "Catch-up incomplete, block deferred");
                    return Ok(BlockOutcome {
                        height,
                        block_hash: block.hash(),
                        transactions: block.transactions.len(),
                        skipped: true,
                        ..Default::default()
                    });
                }
            }
        }
        if matches!(self.reorg.state(), ReorgState::Recovering { .. }) {
            self.reorg.finish_recovery();
        }

        self.process_block(block)
    }

    /// Record that the block at `header.height` left the active chain.
    pub fn on_block_disconnected(&mut self, header: &BlockHeader) {
        self.reorg.on_disconnect(header.height);
    }

    /// Reset derived state after a reorg of `[from, max_height]`.
    #[instrument(skip(self))]
    fn recover(&mut self, from: BlockHeight, max_height: BlockHeight) -> Result<(), EngineError> {
        let contains_freeze = self.tx_index.has_freeze_in_range(from, max_height)?;
        let removed = self.tx_index.delete_range(from, max_height)?;
        debug!(removed, "Dropped index records of disconnected blocks");

        self.watermark = self.floor();
        let outcome = if contains_freeze {
            warn!("Reorganization containing freeze related transactions detected, forcing a reparse");
            self.clear_all_state()?;
            RecoveryOutcome::FullReparse {
                reason: "reorg rolls back freeze-related transactions".into(),
            }
        } else {
            match self.load_most_relevant_state() {
                Ok(height) => {
                    self.watermark = Some(height);
                    RecoveryOutcome::Restored { height }
                }
                Err(e) => {
                    warn!(error = %e, "Unable to restore state, forcing a reparse");
                    self.clear_all_state()?;
                    RecoveryOutcome::FullReparse {
                        reason: e.to_string(),
                    }
                }
            }
        };
        if self.watermark < self.floor() {
            self.watermark = self.floor();
        }

        // Freeze sets are not part of a checkpoint; rebuild them.
        if let RecoveryOutcome::Restored { .. } = outcome {
            self.state.freeze.clear();
            self.replay_rule_state()?;
        }

        info!(outcome = outcome.label(), watermark = ?self.watermark, "Reorg recovery");
        self.observer.on_recovery(&outcome);
        self.observer.on_state_invalidated();
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Scanning
    // ═══════════════════════════════════════════════════════════════════════

    /// Scan from `from` to the current tip.
    pub fn scan(&mut self, from: BlockHeight) -> Result<ScanReport, EngineError> {
        match self.chain.tip_height() {
            Some(tip) => self.scan_range(from, tip),
            None => Ok(ScanReport {
                first: from,
                ..Default::default()
            }),
        }
    }

    /// Scan `[from, to]`, stopping cleanly at a block boundary on shutdown.
    #[instrument(skip(self))]
    pub fn scan_range(&mut self, from: BlockHeight, to: BlockHeight) -> Result<ScanReport, EngineError> {
        let mut report = ScanReport {
            first: from,
            last: to,
            ..Default::default()
        };
        if to < from {
            return Ok(report);
        }
        let (Some(first), Some(last)) = (self.chain.header_at(from), self.chain.header_at(to)) else {
            warn!("Scan range is not on the active chain");
            report.stopped_early = true;
            return Ok(report);
        };

        info!("Scanning for transactions in block {from} to block {to}..");
        let mut progress = ProgressReporter::new(&first, &last, self.config.progress_interval());

        let mut height = from;
        while height <= to {
            if self.chain.shutdown_requested() {
                info!("Shutdown requested, stop scan at block {height} of {to}");
                report.stopped_early = true;
                break;
            }
            let Some(block) = self.chain.block_at(height) else {
                report.stopped_early = true;
                break;
            };
            if let Some(p) = progress.tick(&block.header) {
                info!("{p}");
                self.observer.on_progress(&p);
            }

            let outcome = self.process_block(&block)?;
            report.blocks += 1;
            report.transactions += outcome.transactions;
            report.meta_transactions += outcome.valid;
            report.last_processed = Some(height);

            if height.0 % 100 == 0 {
                debug!(%height, "Finished scanning block");
            }
            height = height.next();
        }

        if report.stopped_early {
            info!("Scan stopped early at block {height} of block {to}");
        }
        info!(
            "{} transactions processed, {} meta transactions found, {} blocks scanned",
            report.transactions, report.meta_transactions, report.blocks
        );
        Ok(report)
    }

    /// Apply one block. Every transaction is classified before any effect
    /// is applied, so an unavailable input leaves state untouched.
    fn process_block(&mut self, block: &Block) -> Result<BlockOutcome, EngineError> {
        let header = &block.header;
        let height = header.height;
        let mut outcome = BlockOutcome {
            height,
            block_hash: header.hash,
            transactions: block.transactions.len(),
            ..Default::default()
        };

        if height < self.config.genesis_height || self.watermark.is_some_and(|w| height <= w) {
            for tx in &block.transactions {
                self.state.pending.remove(&mut self.state.ledger, &tx.txid);
            }
            trace!(%height, "Block at or below watermark skipped");
            outcome.skipped = true;
            return Ok(outcome);
        }

        let classified = self.classify_block(block)?;

        // Effects are applied from here on; a failure leaves the block
        // partly applied, so the engine stops.
        if let Err(e) = self.apply_block(block, classified, &mut outcome) {
            if !self.halted {
                error!(error = %e, %height, "Block partly applied, derived state is inconsistent");
                self.halt(&e);
            }
            return Err(e);
        }
        Ok(outcome)
    }

    fn apply_block(
        &mut self,
        block: &Block,
        classified: Vec<Result<Intent, Rejection>>,
        outcome: &mut BlockOutcome,
    ) -> Result<(), EngineError> {
        let header = &block.header;
        let height = header.height;

        self.observer.on_block_connected(header);
        self.interpreter
            .on_block_begin(height, &mut self.state.context(height, header.hash));

        for (position, (tx, result)) in block.transactions.iter().zip(classified).enumerate() {
            self.state.pending.remove(&mut self.state.ledger, &tx.txid);
            match result {
                Ok(intent) => {
                    outcome.classified += 1;
                    if self.apply_intent(&intent, position as u32, header)? {
                        outcome.valid += 1;
                    }
                }
                Err(rejection) => {
                    outcome.rejected += 1;
                    self.observer.on_transaction_rejected(&tx.txid, &rejection);
                }
            }
        }

        self.interpreter
            .on_block_end(height, &mut self.state.context(height, header.hash));
        self.finalize_block(header, outcome)
    }

    /// Refuse every further block until restart.
    fn halt(&mut self, reason: &EngineError) {
        self.halted = true;
        self.observer.on_shutdown_requested(&reason.to_string());
    }

    fn classify_block(
        &mut self,
        block: &Block,
    ) -> Result<Vec<Result<Intent, Rejection>>, EngineError> {
        let header = &block.header;
        let mut classified = Vec::with_capacity(block.transactions.len());
        for (index, tx) in block.transactions.iter().enumerate() {
            let ctx = BlockContext {
                height: header.height,
                time: header.time,
                index: index as u32,
            };
            match self.classifier.classify(tx, ctx, &*self.chain) {
                Err(rejection) if rejection.is_input_unavailable() => {
                    let e = EngineError::input_unavailable(tx.txid, header.height, &rejection);
                    error!(error = %e, "Block aborted");
                    return Err(e);
                }
                result => classified.push(result),
            }
        }
        Ok(classified)
    }

    /// Interpret one intent and index the result. Returns whether the
    /// interpreter accepted it.
    fn apply_intent(
        &mut self,
        intent: &Intent,
        position: u32,
        header: &BlockHeader,
    ) -> Result<bool, EngineError> {
        let interpretation = self
            .interpreter
            .interpret(intent, &mut self.state.context(header.height, header.hash));
        let result = interpretation.result;

        if result == InterpretResult::Malformed {
            debug!(txid = %intent.txid, "Payload failed to decode, not recorded");
        } else {
            if !result.is_valid() {
                debug!(txid = %intent.txid, code = result.code(), "Transaction invalid");
            }
            self.record(intent, position, &interpretation)?;
        }

        if result.is_valid() && self.config.consensus_hash_every_transaction {
            info!(txid = %intent.txid, consensus_hash = %self.consensus_hash(), "Consensus hash for transaction");
        }
        self.observer
            .on_transaction_classified(intent, &interpretation);
        Ok(result == InterpretResult::Valid)
    }

    fn record(
        &self,
        intent: &Intent,
        position: u32,
        interpretation: &Interpretation,
    ) -> Result<(), EngineError> {
        let result = interpretation.result;
        self.tx_index.record_tx(
            &intent.txid,
            TxRecord {
                valid: result.is_valid(),
                height: intent.block_height,
                tx_type: interpretation.tx_type,
                amended_amount: interpretation.amended_amount,
            },
        )?;
        if !interpretation.sub_records.is_empty() {
            self.tx_index
                .record_sub_records(&intent.txid, &interpretation.sub_records)?;
        }
        self.tx_index.record_outcome(
            &intent.txid,
            TxOutcome {
                position,
                result: result.code(),
            },
        )?;
        Ok(())
    }

    /// Block end: consensus hash, published checkpoint verification,
    /// checkpoint write and watermark advance.
    fn finalize_block(
        &mut self,
        header: &BlockHeader,
        outcome: &mut BlockOutcome,
    ) -> Result<(), EngineError> {
        let height = header.height;
        if self.config.should_hash_block(height) {
            info!(%height, consensus_hash = %self.consensus_hash(), "Consensus hash for block");
        }

        let verdict = if self.config.checkpoint_at(height).is_some() {
            consensus::verify_checkpoint(
                &self.config.checkpoints,
                height,
                &header.hash,
                &self.consensus_hash(),
            )
        } else {
            CheckpointVerdict::Unchecked
        };

        if let CheckpointVerdict::Mismatch { expected } = verdict {
            let e = EngineError::CheckpointMismatch {
                height,
                expected_block: expected.block_hash,
                expected_state: expected.consensus_hash,
                actual_block: header.hash,
                actual_state: self.consensus_hash(),
            };
            error!(error = %e, "Shutting down due to failed checkpoint for block {height}");
            if !self.config.override_forced_shutdown {
                // A restart must reparse rather than trust these files.
                let removed = self.checkpoints.wipe()?;
                warn!(removed, "Removed checkpoint files after failed verification");
                self.halt(&e);
                return Err(e);
            }
        } else if self.should_persist(height) {
            self.save_state(header)?;
            outcome.checkpoint_written = true;
        }

        self.watermark = Some(height);
        self.observer.on_block_finalized(header, outcome);
        Ok(())
    }

    /// Checkpoints are only written close to the tip.
    fn should_persist(&self, height: BlockHeight) -> bool {
        self.chain
            .tip_height()
            .is_some_and(|tip| tip.0 <= height.0.saturating_add(self.config.max_state_history))
    }

    fn save_state(&mut self, header: &BlockHeader) -> Result<(), EngineError> {
        self.checkpoints
            .write(&header.hash, &self.state.ledger, &self.state.globals())?;

        let chain = &self.chain;
        let max_age = self.config.max_state_history;
        let top = header.height.0;
        let pruned = self.checkpoints.prune(|hash| match chain.header(hash) {
            None => true,
            Some(h) => top.saturating_sub(h.height.0) > max_age,
        })?;
        if pruned > 0 {
            debug!(pruned, "Pruned stale checkpoints");
        }

        self.state.registry.set_watermark(&header.hash)?;
        self.observer
            .on_checkpoint_written(header.height, &header.hash);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries and wallet hooks
    // ═══════════════════════════════════════════════════════════════════════

    /// `(available, pending)` for `address` and `property`.
    pub fn balance(&self, address: &Address, property: PropertyId) -> (i64, i64) {
        (
            self.state
                .ledger
                .balance(address, property, TallyKind::Available),
            self.state
                .ledger
                .balance(address, property, TallyKind::Pending),
        )
    }

    pub fn is_frozen(&self, address: &Address, property: PropertyId) -> bool {
        self.state.freeze.is_address_frozen(address, property)
    }

    pub fn watermark(&self) -> Option<BlockHeight> {
        self.watermark
    }

    pub fn consensus_hash(&self) -> Hash {
        consensus::consensus_hash(&self.state.ledger, &self.state.globals())
    }

    /// Reserve funds for an unconfirmed wallet transaction. The reservation
    /// is released when `tx` shows up in a connected block.
    pub fn add_pending(
        &mut self,
        tx: &Transaction,
        address: Address,
        property: PropertyId,
        amount: i64,
    ) -> bool {
        self.state
            .pending
            .add(&mut self.state.ledger, tx.txid, address, property, amount)
    }

    pub fn wallet_summary(&self, is_mine: impl Fn(&Address) -> bool) -> WalletSummary {
        projection::wallet_summary(&self.state.ledger, is_mine)
    }

    pub fn total_tokens(&self, property: PropertyId) -> TokenTotals {
        projection::total_tokens(&self.state.ledger, property)
    }

    pub fn ledger(&self) -> &TallyLedger {
        &self.state.ledger
    }

    pub fn freeze_state(&self) -> &FreezeState {
        &self.state.freeze
    }

    pub fn registry(&self) -> &PropertyRegistry {
        &self.state.registry
    }

    pub fn tx_index(&self) -> &TxIndex {
        &self.tx_index
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn globals(&self) -> GlobalCounters {
        self.state.globals()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reorg_state(&self) -> ReorgState {
        self.reorg.state()
    }

    pub fn input_cache_stats(&self) -> CacheStats {
        self.classifier.cache().stats()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }
}
