//! Batch orchestrator - main harvest orchestration logic
//!
//! This module contains the batch loop that coordinates one harvest pass:
//! - Taking a configuration snapshot
//! - Resolving the sitemap into source references
//! - Registering pending items in storage
//! - Extracting items strictly in order, with duplicate skip and fail-fast
//! - Cooperative cancellation and progress/status events

use crate::config::ConfigProvider;
use crate::crawler::extractor::{ExtractionSettings, PageExtractor};
use crate::crawler::fetcher::Transport;
use crate::crawler::sitemap::SitemapResolver;
use crate::events::{EventBus, EventSink, ProgressEvent, StatusEvent};
use crate::state::{BatchRun, BatchStatus, ItemState, ItemStatus};
use crate::storage::{LogUpdate, Storage, StorageError, StorageResult};
use crate::HarvestError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Storage handle shared between the orchestrator and its host
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Which records a batch covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScope {
    /// The configured number of highest-ID records
    Window,
    /// Every record with `min <= source_id <= max`
    Range { min: i64, max: i64 },
}

/// Result of asking the orchestrator to run
#[derive(Debug)]
pub enum RunOutcome {
    Finished(BatchSummary),
    /// Another batch was in flight; nothing was done
    AlreadyRunning,
}

/// Final report of one batch
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// None when the batch ended before anything was written to storage
    pub batch_id: Option<Uuid>,
    pub status: BatchStatus,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub pending: usize,
    pub elapsed: Duration,
    pub message: String,
    pub run: BatchRun,
}

impl BatchSummary {
    fn new(
        batch_id: Option<Uuid>,
        status: BatchStatus,
        run: BatchRun,
        elapsed: Duration,
        message: String,
    ) -> Self {
        Self {
            batch_id,
            status,
            completed: run.count(ItemStatus::Completed),
            failed: run.count(ItemStatus::Failed),
            skipped: run.count(ItemStatus::Skipped),
            cancelled: run.count(ItemStatus::Cancelled),
            pending: run.count(ItemStatus::Pending),
            elapsed,
            message,
            run,
        }
    }
}

/// Clears the running flag when dropped
struct RunningGuard {
    flag: Arc<AtomicBool>,
}

impl RunningGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Main batch orchestrator structure
///
/// At most one batch runs at a time per orchestrator. Items are processed
/// sequentially; the first item that fails extraction stops the batch and
/// leaves every later item `Pending`.
pub struct Orchestrator {
    storage: SharedStorage,
    config: Arc<dyn ConfigProvider>,
    transport: Arc<dyn Transport>,
    events: EventBus,
    running: Arc<AtomicBool>,
    cancellation: Mutex<CancellationToken>,
}

impl Orchestrator {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    ///
    /// * `storage` - Where batches, item logs and records are written
    /// * `config` - Source of the batch configuration snapshot
    /// * `transport` - Used for the sitemap and every record page
    pub fn new(
        storage: SharedStorage,
        config: Arc<dyn ConfigProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            storage,
            config,
            transport,
            events: EventBus::new(),
            running: Arc::new(AtomicBool::new(false)),
            cancellation: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.events.subscribe(sink);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Requests cancellation of the in-flight batch
    ///
    /// Takes effect at the next item boundary. Does nothing when idle.
    pub fn stop(&self) {
        let current = self
            .cancellation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.is_running() {
            return;
        }
        tracing::info!("Stop requested, cancelling at next item boundary");
        current.cancel();
    }

    /// Runs one window batch to completion
    pub async fn run(&self) -> RunOutcome {
        self.run_scoped(BatchScope::Window).await
    }

    /// Runs one batch over `scope` to completion
    pub async fn run_scoped(&self, scope: BatchScope) -> RunOutcome {
        let Some((_guard, token)) = self.begin() else {
            self.report_already_running();
            return RunOutcome::AlreadyRunning;
        };
        RunOutcome::Finished(self.execute(scope, token).await)
    }

    /// Spawns a window batch on the tokio runtime
    ///
    /// Returns `None` and emits an "already running" status when a batch is
    /// in flight.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<BatchSummary>> {
        self.start_scoped(BatchScope::Window)
    }

    pub fn start_scoped(self: &Arc<Self>, scope: BatchScope) -> Option<JoinHandle<BatchSummary>> {
        let Some((guard, token)) = self.begin() else {
            self.report_already_running();
            return None;
        };
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _guard = guard;
            this.execute(scope, token).await
        }))
    }

    /// Runs the main batch loop
    ///
    /// 1. Takes the configuration snapshot
    /// 2. Resolves the sitemap
    /// 3. Registers the batch and a pending log per item
    /// 4. Processes items in order until done, failed or cancelled
    /// 5. Records and announces the outcome
    async fn execute(&self, scope: BatchScope, token: CancellationToken) -> BatchSummary {
        let started = Instant::now();

        let snapshot = match self.config.batch_config() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return self.end_without_batch(
                    BatchStatus::Failed,
                    format!("Batch failed: {}", HarvestError::from(e)),
                    started,
                );
            }
        };
        let batch = &snapshot.batch;

        let resolver = SitemapResolver::new(self.transport.clone(), batch.fetch_timeout());
        let resolved = match scope {
            BatchScope::Window => resolver.resolve(&batch.sitemap_url, batch.window_size).await,
            BatchScope::Range { min, max } => {
                resolver.resolve_range(&batch.sitemap_url, min, max).await
            }
        };
        let references = match resolved {
            Ok(references) => references,
            Err(e) => {
                return self.end_without_batch(
                    BatchStatus::Failed,
                    format!("Batch failed: could not resolve sitemap: {}", e),
                    started,
                );
            }
        };
        if references.is_empty() {
            return self.end_without_batch(
                BatchStatus::Empty,
                format!("No items found in sitemap {}", batch.sitemap_url),
                started,
            );
        }

        let mut run = BatchRun::new(references);
        let batch_id = run.batch_id;

        if let Err(e) = self.register(&mut run, &snapshot.hash) {
            let message = format!("Batch failed: could not register items: {}", e);
            self.record_outcome(batch_id, BatchStatus::Failed, &message);
            self.events
                .emit_status(StatusEvent::new(Some(batch_id), BatchStatus::Failed, &message));
            run.finish();
            return BatchSummary::new(
                Some(batch_id),
                BatchStatus::Failed,
                run,
                started.elapsed(),
                message,
            );
        }

        tracing::info!("Starting batch {} with {} items", batch_id, run.total());
        self.events.emit_status(StatusEvent::new(
            Some(batch_id),
            BatchStatus::Running,
            format!("Batch started: {} items", run.total()),
        ));

        let settings = ExtractionSettings::from(batch);
        let extractor = PageExtractor::new(self.transport.clone());
        let mut status = BatchStatus::Completed;
        let mut failure = None;

        for index in 0..run.total() {
            if token.is_cancelled() {
                self.cancel_remaining(&mut run, index);
                status = BatchStatus::Cancelled;
                break;
            }

            if let Err(e) = self.process_item(&mut run, index, &extractor, &settings).await {
                self.fail_item(&mut run, index, &e);
                failure = Some((index, e));
                status = BatchStatus::Failed;
                break;
            }
        }

        run.finish();
        let elapsed = started.elapsed();
        let failure = failure.as_ref().map(|(index, e)| (*index, e));
        let mut message = summary_message(status, &run, elapsed, failure);

        if let Err(e) = self.with_storage(|s| s.finish_batch(batch_id, status, &message)) {
            tracing::error!("Failed to record outcome of batch {}: {}", batch_id, e);
            status = BatchStatus::Failed;
            message = format!("{}; could not record outcome: {}", message, e);
        }

        self.events
            .emit_status(StatusEvent::new(Some(batch_id), status, &message));

        BatchSummary::new(Some(batch_id), status, run, elapsed, message)
    }

    /// Processes a single item
    ///
    /// This method:
    /// 1. Skips the item if its source ID is already stored
    /// 2. Extracts the page (retries happen inside the extractor)
    /// 3. Persists the record, its mapping and the Completed log row together
    ///
    /// Any error means the batch must stop at this item. An item's in-memory
    /// status only changes after its log row has been written.
    async fn process_item(
        &self,
        run: &mut BatchRun,
        index: usize,
        extractor: &PageExtractor,
        settings: &ExtractionSettings,
    ) -> Result<(), HarvestError> {
        let reference = run.items[index].reference.clone();

        if self.with_storage(|s| s.record_exists(reference.source_id))? {
            tracing::info!("Skipping {} (#{}): already stored", reference.slug, reference.source_id);
            self.advance(run, index, ItemStatus::Skipped)?;
            return Ok(());
        }

        self.advance(run, index, ItemStatus::InProgress)?;

        let result = extractor.extract(&reference, settings).await;
        run.items[index].attempts = result.attempts;

        if !result.is_success() {
            let detail = result.error_detail.unwrap_or_default();
            let mut failed = run.items[index].clone();
            failed.error_detail = Some(detail.clone());
            failed.transition(ItemStatus::Failed)?;
            self.persist_item(&failed)?;
            self.commit(run, index, failed);
            return Err(HarvestError::ExtractionFailed {
                slug: reference.slug,
                detail,
            });
        }

        let mut completed = run.items[index].clone();
        completed.transition(ItemStatus::Completed)?;
        let log_id = completed.log_id.ok_or_else(|| {
            StorageError::Database(format!("No log row registered for {}", reference.slug))
        })?;
        let update = LogUpdate::from(&completed);
        self.with_storage(|s| s.persist_extraction(&result, log_id, &update))?;
        self.commit(run, index, completed);
        Ok(())
    }

    /// Moves an item to `next` once its log row has been written
    fn advance(
        &self,
        run: &mut BatchRun,
        index: usize,
        next: ItemStatus,
    ) -> Result<(), HarvestError> {
        let mut item = run.items[index].clone();
        item.transition(next)?;
        self.persist_item(&item)?;
        self.commit(run, index, item);
        Ok(())
    }

    /// Replaces the in-memory item with its persisted state and emits progress
    fn commit(&self, run: &mut BatchRun, index: usize, item: ItemState) {
        let event = ProgressEvent {
            batch_id: run.batch_id,
            current: index + 1,
            total: run.total(),
            item: item.reference.clone(),
            status: item.status,
        };
        run.items[index] = item;
        self.events.emit_progress(event);
    }

    /// Marks the stopping item `Failed` if the error left it unfinished
    fn fail_item(&self, run: &mut BatchRun, index: usize, error: &HarvestError) {
        let item = &mut run.items[index];
        if item.status.is_terminal() {
            return;
        }

        item.error_detail = Some(failure_detail(error));
        if item.status == ItemStatus::Pending {
            let _ = item.transition(ItemStatus::InProgress);
        }
        if item.transition(ItemStatus::Failed).is_ok() {
            if let Err(e) = self.persist_item(item) {
                tracing::warn!("Could not persist failure of {}: {}", item.reference.slug, e);
            }
        }
    }

    fn cancel_remaining(&self, run: &mut BatchRun, from: usize) {
        tracing::info!(
            "Batch {} cancelled, {} items left unprocessed",
            run.batch_id,
            run.total() - from
        );
        for item in run.items.iter_mut().skip(from) {
            if item.status.is_terminal() || item.transition(ItemStatus::Cancelled).is_err() {
                continue;
            }
            if let Err(e) = self.persist_item(item) {
                tracing::warn!("Could not persist cancellation of {}: {}", item.reference.slug, e);
            }
        }
    }

    /// Creates the batch row and one pending log row per item
    fn register(&self, run: &mut BatchRun, config_hash: &str) -> StorageResult<()> {
        let batch_id = run.batch_id;
        let started_at = run.started_at;
        self.with_storage(|s| {
            s.create_batch(batch_id, config_hash, started_at)?;
            for item in run.items.iter_mut() {
                item.log_id = Some(s.create_pending_log(batch_id, &item.reference)?);
            }
            Ok(())
        })
    }

    fn persist_item(&self, item: &ItemState) -> StorageResult<()> {
        let Some(log_id) = item.log_id else {
            return Ok(());
        };
        let update = LogUpdate::from(item);
        self.with_storage(|s| s.update_log(log_id, &update))
    }

    fn record_outcome(&self, batch_id: Uuid, status: BatchStatus, message: &str) {
        if let Err(e) = self.with_storage(|s| s.finish_batch(batch_id, status, message)) {
            tracing::error!("Failed to record outcome of batch {}: {}", batch_id, e);
        }
    }

    fn end_without_batch(
        &self,
        status: BatchStatus,
        message: String,
        started: Instant,
    ) -> BatchSummary {
        self.events
            .emit_status(StatusEvent::new(None, status, &message));
        let mut run = BatchRun::new(Vec::new());
        run.finish();
        BatchSummary::new(None, status, run, started.elapsed(), message)
    }

    fn report_already_running(&self) {
        tracing::warn!("Batch already running, ignoring start request");
        self.events.emit_status(StatusEvent::new(
            None,
            BatchStatus::Running,
            "Batch already running",
        ));
    }

    /// Claims the running flag and installs a fresh cancellation token
    ///
    /// Both happen under the cancellation lock, so a concurrent `stop()` either
    /// sees the flag clear or cancels the token this batch will observe.
    fn begin(&self) -> Option<(RunningGuard, CancellationToken)> {
        let mut current = self
            .cancellation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let guard = RunningGuard::acquire(&self.running)?;
        let token = CancellationToken::new();
        *current = token.clone();
        Some((guard, token))
    }

    // Guards never live across an await: every storage call goes through here.
    fn with_storage<T>(
        &self,
        f: impl FnOnce(&mut dyn Storage) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|e| StorageError::Database(format!("Storage lock poisoned: {}", e)))?;
        f(&mut *storage)
    }
}

/// Human-readable terminal message
///
/// "Batch completed: 20 completed, 0 failed, 0 skipped in 3.4s", with the
/// stopping item and its cause appended on failure and the cancelled count on
/// cancel.
fn summary_message(
    status: BatchStatus,
    run: &BatchRun,
    elapsed: Duration,
    failure: Option<(usize, &HarvestError)>,
) -> String {
    let mut message = format!(
        "Batch {}: {} completed, {} failed, {} skipped in {:.1}s",
        status,
        run.count(ItemStatus::Completed),
        run.count(ItemStatus::Failed),
        run.count(ItemStatus::Skipped),
        elapsed.as_secs_f64()
    );

    if let Some((index, error)) = failure {
        let slug = run
            .items
            .get(index)
            .map_or("unknown item", |item| item.reference.slug.as_str());
        message.push_str(&format!("; stopped at {}: {}", slug, failure_detail(error)));
    }

    if status == BatchStatus::Cancelled {
        message.push_str(&format!("; {} cancelled", run.count(ItemStatus::Cancelled)));
    }

    message
}

/// Cause recorded against the item a batch stopped at
fn failure_detail(error: &HarvestError) -> String {
    match error {
        HarvestError::ExtractionFailed { detail, .. } => detail.clone(),
        other => other.to_string(),
    }
}
