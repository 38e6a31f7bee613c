//! Rate-limited FIFO dispatcher.
//!
//! Entries are dispatched one per tick of `dispatch_interval`, oldest
//! first. Dispatch is fire-and-forget: the ticker never waits for a
//! provider call, so a slow submit does not hold back the next entry.
//! When the list runs dry the ticker stops itself; the next
//! [`JobQueue::start`] creates a fresh one.
//!
//! A key stays in the queued set from `enqueue` until its dispatch marks
//! the job `pending`, so the set is empty once the ticker has retired and
//! every popped entry has started. Each accepted enqueue gets a fresh
//! ticket; a popped entry only dispatches while its ticket is still the
//! one queued for its key, so a reset followed by a re-enqueue retires the
//! older entry instead of the newer one.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use scenegen_core::job::{JobKey, JobStatus};
use scenegen_providers::{GenerationProvider, GenerationRequest, ProviderError, Submission};

use crate::board::JobBoard;
use crate::handoff::Handoff;
use crate::reconciler::{PollTarget, Reconciler};
use crate::registry::ProviderRegistry;

/// One job waiting for dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub entity_id: scenegen_core::types::EntityId,
    /// Provider name; the kind's default provider when absent.
    #[serde(default)]
    pub provider: Option<String>,
    pub request: GenerationRequest,
    /// Dispatches already tried for this entry.
    #[serde(skip)]
    dispatch_attempts: u32,
    /// Assigned when the entry is accepted into the queue.
    #[serde(skip)]
    ticket: u64,
}

impl QueueEntry {
    pub fn new(entity_id: impl Into<scenegen_core::types::EntityId>, request: GenerationRequest) -> Self {
        Self {
            entity_id: entity_id.into(),
            provider: None,
            request,
            dispatch_attempts: 0,
            ticket: 0,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.entity_id.clone(), self.request.kind)
    }
}

struct Ticker {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<QueueEntry>,
    /// Ticket of the entry currently queued for each key.
    queued: HashMap<JobKey, u64>,
    next_ticket: u64,
    ticker: Option<Ticker>,
}

/// Why a submit did not produce a usable result.
struct DispatchFailure {
    attempt: u64,
    error: ProviderError,
}

pub struct JobQueue {
    board: Arc<JobBoard>,
    registry: Arc<ProviderRegistry>,
    reconciler: Arc<Reconciler>,
    handoff: Handoff,
    interval: Duration,
    retry_limit: u32,
    inner: Mutex<QueueInner>,
    next_ticker_id: AtomicU64,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

impl JobQueue {
    pub fn new(
        board: Arc<JobBoard>,
        registry: Arc<ProviderRegistry>,
        reconciler: Arc<Reconciler>,
        handoff: Handoff,
        interval: Duration,
        retry_limit: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            board,
            registry,
            reconciler,
            handoff,
            interval,
            retry_limit,
            inner: Mutex::new(QueueInner::default()),
            next_ticker_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        })
    }

    /// Append an entry unless its key is already queued or its job is
    /// pending, queueing or succeeded. Returns whether it was accepted.
    pub async fn enqueue(&self, mut entry: QueueEntry) -> bool {
        let key = entry.key();
        let mut inner = self.inner.lock().await;
        if self.board.blocks_enqueue(&key).await {
            tracing::debug!(job = %key, "Enqueue ignored: job in progress or done");
            return false;
        }
        if inner.queued.contains_key(&key) {
            tracing::debug!(job = %key, "Enqueue ignored: already queued");
            return false;
        }
        inner.next_ticket += 1;
        entry.ticket = inner.next_ticket;
        inner.queued.insert(key.clone(), entry.ticket);
        inner.pending.push_back(entry);
        tracing::debug!(job = %key, depth = inner.pending.len(), "Job enqueued");
        true
    }

    /// Start the ticker. Idempotent while a ticker is running.
    pub async fn start(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        self.spawn_ticker(&mut inner);
    }

    /// Start a ticker unless one is running or the queue is shut down.
    /// Called with the queue lock held.
    fn spawn_ticker(self: &Arc<Self>, inner: &mut QueueInner) {
        if self.cancel.is_cancelled() || inner.ticker.is_some() {
            return;
        }

        let id = self.next_ticker_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.cancel.child_token();
        inner.ticker = Some(Ticker {
            id,
            cancel: cancel.clone(),
        });
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            depth = inner.pending.len(),
            "Dispatch ticker started",
        );

        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.run_ticker(id, cancel).await });
    }

    /// Stop the ticker. Queued entries stay queued.
    pub async fn stop(&self) {
        if let Some(ticker) = self.inner.lock().await.ticker.take() {
            ticker.cancel.cancel();
            tracing::info!("Dispatch ticker stopped");
        }
    }

    /// Remove a queued entry. Returns whether one was removed.
    pub async fn dequeue(&self, key: &JobKey) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.pending.len();
        inner.pending.retain(|e| &e.key() != key);
        let removed = inner.pending.len() != before;
        inner.queued.remove(key);
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.pending.is_empty()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.ticker.is_some()
    }

    /// Stop the ticker for good; later `start` calls are ignored.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.stop().await;
    }

    /// Dispatch one entry now, bypassing the queue. Transient submit errors
    /// fail the job immediately. Returns the job's status afterwards.
    pub async fn generate(&self, entry: QueueEntry) -> JobStatus {
        let key = entry.key();
        if let Err(failure) = self.dispatch_once(&entry, false).await {
            self.handoff
                .fail(&key, failure.attempt, &failure.error.to_string())
                .await;
        }
        self.board.status(&key).await.unwrap_or(JobStatus::Idle)
    }

    // ---- private helpers ----

    async fn run_ticker(self: Arc<Self>, id: u64, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(entry) = self.pop_or_retire(id).await else {
                        break;
                    };
                    let queue = Arc::clone(&self);
                    tokio::spawn(async move { queue.dispatch_queued(entry).await });
                }
            }
        }
    }

    /// Pop the head, or retire ticker `id` if the list is empty.
    async fn pop_or_retire(&self, id: u64) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().await;
        if inner.ticker.as_ref().map(|t| t.id) != Some(id) {
            return None;
        }
        let entry = inner.pending.pop_front();
        if entry.is_none() {
            inner.ticker = None;
            tracing::debug!("Dispatch queue drained, ticker stopped");
        }
        entry
    }

    async fn dispatch_queued(self: Arc<Self>, mut entry: QueueEntry) {
        entry.dispatch_attempts += 1;
        let key = entry.key();

        let Err(failure) = self.dispatch_once(&entry, true).await else {
            return;
        };

        if failure.error.is_transient() && entry.dispatch_attempts <= self.retry_limit {
            if self.requeue(entry, failure.attempt).await {
                tracing::warn!(
                    job = %key,
                    attempt = failure.attempt,
                    error = %failure.error,
                    "Transient submit failure, re-queued",
                );
            }
            return;
        }

        self.handoff
            .fail(&key, failure.attempt, &failure.error.to_string())
            .await;
    }

    /// Put a retried entry back at the tail, provided the attempt that
    /// failed is still the job's current one, and make sure a ticker will
    /// pick it up.
    async fn requeue(self: &Arc<Self>, entry: QueueEntry, attempt: u64) -> bool {
        let key = entry.key();
        let mut inner = self.inner.lock().await;
        let current = self.board.get(&key).await;
        let still_current = current
            .is_some_and(|s| s.is_attempt(attempt) && s.status == JobStatus::Pending);
        if !still_current || inner.queued.contains_key(&key) {
            return false;
        }
        inner.queued.insert(key, entry.ticket);
        inner.pending.push_back(entry);
        self.spawn_ticker(&mut inner);
        true
    }

    /// Mark the job pending and release its queue slot in one step, so an
    /// enqueue racing with dispatch sees either the queued key or the
    /// pending status.
    ///
    /// A queued entry (`ticket` set) that no longer holds its key's queue
    /// slot, because it was dequeued after being popped and possibly
    /// replaced by a newer enqueue, is dropped and `None` returned.
    async fn begin_attempt(
        &self,
        key: &JobKey,
        provider: &str,
        ticket: Option<u64>,
    ) -> Option<u64> {
        let mut inner = self.inner.lock().await;
        if let Some(ticket) = ticket {
            if inner.queued.get(key) != Some(&ticket) {
                return None;
            }
        }
        let attempt = self.board.begin_dispatch(key, provider).await;
        inner.pending.retain(|e| &e.key() != key);
        inner.queued.remove(key);
        Some(attempt)
    }

    /// Resolve the provider, start a new attempt and submit.
    async fn dispatch_once(&self, entry: &QueueEntry, queued: bool) -> Result<(), DispatchFailure> {
        let key = entry.key();

        let resolved = self
            .registry
            .resolve(entry.request.kind, entry.provider.as_deref());
        let provider_name = match &resolved {
            Ok(provider) => provider.name().to_string(),
            Err(_) => entry.provider.clone().unwrap_or_else(|| "default".into()),
        };

        let ticket = queued.then_some(entry.ticket);
        let Some(attempt) = self.begin_attempt(&key, &provider_name, ticket).await else {
            tracing::debug!(job = %key, "Entry dequeued before dispatch, dropping");
            return Ok(());
        };
        let provider = resolved.map_err(|error| DispatchFailure { attempt, error })?;

        tracing::info!(
            job = %key,
            attempt,
            provider = provider.name(),
            "Dispatching generation job",
        );

        let submission = provider
            .submit(&entry.request)
            .await
            .map_err(|error| DispatchFailure { attempt, error })?;

        let metadata = provenance(provider.as_ref(), entry, &submission);
        match submission {
            Submission::Completed { artifact } => {
                self.handoff.succeed(&key, attempt, artifact, metadata).await;
            }
            Submission::Accepted { task_handle } => {
                match self.board.mark_queueing(&key, attempt, &task_handle).await {
                    Ok(()) => {
                        self.reconciler
                            .start_polling(PollTarget {
                                key,
                                provider,
                                task_handle,
                                attempt,
                                metadata,
                            })
                            .await;
                    }
                    Err(e) => {
                        tracing::debug!(
                            job = %key,
                            attempt,
                            task_handle = %task_handle,
                            reason = %e,
                            "Job moved on during submit, cancelling orphaned task",
                        );
                        if let Err(e) = provider.cancel(&task_handle).await {
                            tracing::debug!(job = %key, error = %e, "Best-effort cancel failed");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Provenance stored with the artifact.
fn provenance(
    provider: &dyn GenerationProvider,
    entry: &QueueEntry,
    submission: &Submission,
) -> serde_json::Value {
    let mut metadata = serde_json::json!({
        "provider": provider.name(),
        "prompt": entry.request.prompt,
    });
    if let Some(reference) = &entry.request.reference_url {
        metadata["reference_url"] = reference.clone().into();
    }
    if let Submission::Accepted { task_handle } = submission {
        metadata["task_handle"] = task_handle.clone().into();
    }
    metadata
}
