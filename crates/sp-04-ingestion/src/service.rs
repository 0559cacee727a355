//! # Ingestion Service
//!
//! Owns the watermark and drives both discovery paths through one pipeline:
//!
//! ```text
//! poll timer ──► list_recent_signatures ─┐
//!                                         ├─► process_signature ─► decode ─► handlers
//! live feed  ──► SignatureNotice ─────────┘
//! ```
//!
//! Both paths may run concurrently. Double delivery is absorbed by the
//! mirror's uniqueness constraints, not by locking here.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use shared_bus::{ErrorKind, EventPublisher, SyncEvent};
use shared_types::{Address, Slot, TxSignature};
use sp_01_ledger_reader::{LedgerError, LedgerReader};
use sp_02_instruction_decoder::decode;
use sp_03_mirror_store::MirrorStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::domain::{IngestionConfig, RetryDecision, SyncError, Watermark};
use crate::handlers::{HandleOutcome, InstructionHandlers, TxContext};

/// What happened to one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// At or below the watermark and not queued for retry.
    Skipped,
    /// Fetched and dispatched; the watermark moved to its slot.
    Handled { applied: usize },
    /// The transaction failed on chain; nothing to mirror.
    FailedOnChain,
    /// Fetch or handling failed transiently; queued for the next cycle.
    Deferred,
    /// Retry budget spent; dropped and reported.
    Abandoned,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub candidates: usize,
    pub handled: usize,
    pub deferred: usize,
}

struct Pipeline {
    program_id: Address,
    config: IngestionConfig,
    ledger: Arc<dyn LedgerReader>,
    store: Arc<dyn MirrorStore>,
    bus: Arc<dyn EventPublisher>,
    handlers: InstructionHandlers,
    watermark: Mutex<Watermark>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Watermark-tracked ingestion of the program's transactions.
pub struct IngestionService {
    pipeline: Arc<Pipeline>,
    running: Mutex<Option<Running>>,
}

impl IngestionService {
    /// Build the service, resuming from the persisted watermark.
    pub fn new(
        program_id: Address,
        config: IngestionConfig,
        ledger: Arc<dyn LedgerReader>,
        store: Arc<dyn MirrorStore>,
        bus: Arc<dyn EventPublisher>,
        handlers: InstructionHandlers,
    ) -> Result<Self, SyncError> {
        let slot = store.load_watermark()?.unwrap_or(0);
        info!(program = %program_id, watermark = slot, "[sp-04] ingestion resuming");
        Ok(Self {
            pipeline: Arc::new(Pipeline {
                program_id,
                config,
                ledger,
                store,
                bus,
                handlers,
                watermark: Mutex::new(Watermark::new(slot)),
            }),
            running: Mutex::new(None),
        })
    }

    pub fn watermark(&self) -> Slot {
        self.pipeline.watermark.lock().slot()
    }

    /// Signatures waiting for another attempt.
    pub fn pending_retries(&self) -> usize {
        self.pipeline.watermark.lock().retry_count()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start the poll loop and, when enabled, the live feed.
    pub async fn start(&self) -> Result<(), SyncError> {
        let (shutdown, rx) = watch::channel(false);
        {
            let mut running = self.running.lock();
            if running.is_some() {
                return Err(SyncError::AlreadyRunning);
            }
            let mut tasks = vec![tokio::spawn(run_poll(self.pipeline.clone(), rx.clone()))];
            if self.pipeline.config.subscription_enabled {
                tasks.push(tokio::spawn(run_feed(self.pipeline.clone(), rx)));
            }
            *running = Some(Running { shutdown, tasks });
        }

        let watermark = self.watermark();
        info!(
            program = %self.pipeline.program_id,
            watermark,
            poll_interval_secs = self.pipeline.config.poll_interval_secs,
            "[sp-04] ingestion started"
        );
        self.pipeline
            .bus
            .publish(SyncEvent::Started {
                program_id: self.pipeline.program_id,
                watermark,
            })
            .await;
        Ok(())
    }

    /// Stop the poll timer, drop the live feed and persist the watermark.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown.send(true);
        for task in running.tasks {
            if let Err(e) = task.await {
                warn!("[sp-04] ingestion task ended abnormally: {}", e);
            }
        }

        let (slot, durable) = {
            let mark = self.pipeline.watermark.lock();
            (mark.slot(), mark.durable_slot())
        };
        self.pipeline.persist(durable).await;
        info!(watermark = slot, "[sp-04] ingestion stopped");
        self.pipeline
            .bus
            .publish(SyncEvent::Stopped { watermark: slot })
            .await;
    }

    /// Run one poll cycle now.
    pub async fn poll_once(&self) -> Result<PollReport, SyncError> {
        self.pipeline.poll_once().await
    }

    /// Process one signature as if it had been delivered by the live feed.
    pub async fn process_signature(&self, signature: &TxSignature, slot: Slot) -> ProcessOutcome {
        self.pipeline.process_signature(signature, slot).await
    }
}

impl Pipeline {
    async fn poll_once(&self) -> Result<PollReport, SyncError> {
        let listed = match self
            .ledger
            .list_recent_signatures(&self.program_id, self.config.signature_page_size)
            .await
        {
            Ok(listed) => listed,
            Err(e) => {
                let err = SyncError::from(e);
                self.report(&err, None).await;
                return Err(err);
            }
        };

        // Listing is newest first; queued retries come along even when they
        // have scrolled off the page.
        let mut seen = HashSet::new();
        let mut candidates: Vec<(TxSignature, Slot)> = listed
            .into_iter()
            .rev()
            .filter(|info| !info.failed)
            .map(|info| (info.signature, info.slot))
            .collect();
        let retries = self.watermark.lock().pending_retries();
        candidates.extend(retries);
        candidates.retain(|(sig, _)| seen.insert(sig.clone()));
        candidates.sort_by_key(|(_, slot)| *slot);

        let mut report = PollReport {
            candidates: candidates.len(),
            ..PollReport::default()
        };
        for (signature, slot) in &candidates {
            match self.process_signature(signature, *slot).await {
                ProcessOutcome::Handled { .. } => report.handled += 1,
                ProcessOutcome::Deferred => report.deferred += 1,
                _ => {}
            }
        }
        debug!(
            candidates = report.candidates,
            handled = report.handled,
            deferred = report.deferred,
            "[sp-04] poll cycle complete"
        );
        Ok(report)
    }

    async fn process_signature(&self, signature: &TxSignature, slot: Slot) -> ProcessOutcome {
        let wanted = self.watermark.lock().should_process(signature, slot);
        if !wanted {
            return ProcessOutcome::Skipped;
        }

        let tx = match self.ledger.get_transaction(signature).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                let err = SyncError::from(LedgerError::Unavailable(format!(
                    "transaction {signature} not yet available"
                )));
                return self.defer(signature, slot, &err).await;
            }
            Err(e) => return self.defer(signature, slot, &SyncError::from(e)).await,
        };

        if tx.failed {
            debug!(signature = %signature, slot = tx.slot, "[sp-04] transaction failed on chain");
            self.watermark.lock().clear_retry(signature);
            return ProcessOutcome::FailedOnChain;
        }

        let ctx = TxContext {
            signature,
            slot: tx.slot,
        };
        let mut applied = 0;
        for instruction in tx
            .instructions
            .iter()
            .filter(|ix| ix.program_id == self.program_id)
        {
            let decoded = match decode(instruction, &self.program_id, tx.block_time) {
                Ok(decoded) => decoded,
                Err(e) => {
                    self.report(&SyncError::from(e), Some(signature)).await;
                    continue;
                }
            };
            if decoded.operation.is_unknown() {
                debug!(
                    signature = %signature,
                    opcode = ?instruction.opcode(),
                    "[sp-04] unknown operation, skipping"
                );
                continue;
            }
            match self.handlers.handle(&decoded, ctx).await {
                Ok(HandleOutcome::Applied) => applied += 1,
                Ok(_) => {}
                Err(e) if e.is_transient() => return self.defer(signature, tx.slot, &e).await,
                Err(e) => self.report(&e, Some(signature)).await,
            }
        }

        let durable = {
            let mut mark = self.watermark.lock();
            mark.clear_retry(signature);
            mark.advance(tx.slot);
            mark.durable_slot()
        };
        self.persist(durable).await;
        debug!(signature = %signature, slot = tx.slot, applied, "[sp-04] transaction handled");
        ProcessOutcome::Handled { applied }
    }

    async fn defer(&self, signature: &TxSignature, slot: Slot, err: &SyncError) -> ProcessOutcome {
        let decision =
            self.watermark
                .lock()
                .record_failure(signature, slot, self.config.max_retry_attempts);
        match decision {
            RetryDecision::Retry { attempt } => {
                warn!(
                    signature = %signature,
                    slot,
                    attempt,
                    "[sp-04] deferred to next cycle: {}",
                    err
                );
                self.report(err, Some(signature)).await;
                ProcessOutcome::Deferred
            }
            RetryDecision::Exhausted { attempts } => {
                error!(
                    signature = %signature,
                    slot,
                    attempts,
                    "[sp-04] giving up on transaction: {}",
                    err
                );
                self.bus
                    .publish(SyncEvent::Error {
                        kind: ErrorKind::RetryExhausted,
                        message: format!("gave up after {attempts} attempts: {err}"),
                        signature: Some(signature.clone()),
                    })
                    .await;
                let durable = self.watermark.lock().durable_slot();
                self.persist(durable).await;
                ProcessOutcome::Abandoned
            }
        }
    }

    async fn report(&self, err: &SyncError, signature: Option<&TxSignature>) {
        if err.is_reported() {
            return;
        }
        match signature {
            Some(sig) => warn!(signature = %sig, "[sp-04] {}", err),
            None => warn!("[sp-04] {}", err),
        }
        self.bus
            .publish(SyncEvent::Error {
                kind: err.kind(),
                message: err.to_string(),
                signature: signature.cloned(),
            })
            .await;
    }

    async fn persist(&self, slot: Slot) {
        if let Err(e) = self.store.save_watermark(slot) {
            self.report(&SyncError::from(e), None).await;
        }
    }
}

// =============================================================================
// BACKGROUND TASKS
// =============================================================================

async fn run_poll(pipeline: Arc<Pipeline>, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(pipeline.config.poll_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are already reported on the bus.
                let _ = pipeline.poll_once().await;
            }
            _ = shutdown.changed() => {
                info!("[sp-04] poll loop stopping");
                return;
            }
        }
    }
}

async fn run_feed(pipeline: Arc<Pipeline>, mut shutdown: watch::Receiver<bool>) {
    let backoff = Duration::from_secs(pipeline.config.resubscribe_backoff_secs.max(1));

    loop {
        match pipeline.ledger.subscribe(&pipeline.program_id).await {
            Ok(mut feed) => {
                info!("[sp-04] live feed open");
                loop {
                    tokio::select! {
                        notice = feed.next() => match notice {
                            Some(notice) => {
                                pipeline.process_signature(&notice.signature, notice.slot).await;
                            }
                            None => {
                                warn!("[sp-04] live feed dropped, re-subscribing");
                                break;
                            }
                        },
                        _ = shutdown.changed() => {
                            info!("[sp-04] live feed closing");
                            return;
                        }
                    }
                }
            }
            Err(LedgerError::SubscriptionUnsupported(reason)) => {
                info!("[sp-04] no live feed ({}), polling only", reason);
                return;
            }
            Err(e) => {
                warn!("[sp-04] live feed unavailable: {}", e);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => return,
        }
    }
}
