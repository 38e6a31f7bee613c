//! Process-wide owner of the dispatcher, the reconciler and the job board.
//!
//! Created once per process with [`Orchestrator::new`] (or
//! [`Orchestrator::from_config`]) and torn down with
//! [`Orchestrator::shutdown`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use scenegen_core::job::{JobKey, JobState, JobStatus};
use scenegen_providers::ProviderError;

use crate::board::JobBoard;
use crate::config::OrchestratorConfig;
use crate::events::JobEvent;
use crate::handoff::Handoff;
use crate::queue::{JobQueue, QueueEntry};
use crate::reconciler::Reconciler;
use crate::registry::ProviderRegistry;
use crate::sink::{ArtifactSink, AssetStoreClient};

/// How long shutdown waits for artifacts still being handed to the sink.
const PERSIST_GRACE: Duration = Duration::from_secs(30);

pub struct Orchestrator {
    board: Arc<JobBoard>,
    registry: Arc<ProviderRegistry>,
    queue: Arc<JobQueue>,
    reconciler: Arc<Reconciler>,
    handoff: Handoff,
}

impl Orchestrator {
    pub fn new(
        config: &OrchestratorConfig,
        registry: ProviderRegistry,
        sink: Option<Arc<dyn ArtifactSink>>,
    ) -> Self {
        let board = Arc::new(JobBoard::new());
        let registry = Arc::new(registry);
        let handoff = Handoff::new(Arc::clone(&board), sink);
        let reconciler = Reconciler::new(Arc::clone(&board), handoff.clone(), config.poll.clone());
        let queue = JobQueue::new(
            Arc::clone(&board),
            Arc::clone(&registry),
            Arc::clone(&reconciler),
            handoff.clone(),
            config.dispatch_interval,
            config.dispatch_retry_limit,
        );

        tracing::info!(
            providers = ?registry.names(),
            dispatch_interval_ms = config.dispatch_interval.as_millis() as u64,
            poll_interval_ms = config.poll.interval.as_millis() as u64,
            "Orchestrator ready",
        );

        Self {
            board,
            registry,
            queue,
            reconciler,
            handoff,
        }
    }

    /// Build provider clients and the asset store sink from configuration.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, ProviderError> {
        let registry =
            ProviderRegistry::from_settings(&config.providers, config.provider_request_timeout)?;
        let sink = match &config.asset_store {
            Some(settings) => {
                let client = reqwest::Client::builder()
                    .timeout(config.provider_request_timeout)
                    .build()?;
                Some(Arc::new(AssetStoreClient::new(client, settings)) as Arc<dyn ArtifactSink>)
            }
            None => None,
        };
        Ok(Self::new(config, registry, sink))
    }

    pub fn board(&self) -> &JobBoard {
        &self.board
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.board.subscribe()
    }

    pub async fn state(&self, key: &JobKey) -> Option<JobState> {
        self.board.get(key).await
    }

    /// Queue an entry for rate-limited dispatch. See [`JobQueue::enqueue`].
    pub async fn enqueue(&self, entry: QueueEntry) -> bool {
        self.queue.enqueue(entry).await
    }

    /// Start (or keep) the dispatch ticker.
    pub async fn start(&self) {
        self.queue.start().await;
    }

    /// Stop the dispatch ticker, keeping queued entries.
    pub async fn stop(&self) {
        self.queue.stop().await;
    }

    /// Enqueue and make sure the ticker runs.
    pub async fn schedule(&self, entry: QueueEntry) -> bool {
        let accepted = self.queue.enqueue(entry).await;
        if accepted {
            self.queue.start().await;
        }
        accepted
    }

    /// Regenerate one entity immediately, superseding whatever it was doing.
    pub async fn generate(&self, entry: QueueEntry) -> JobStatus {
        let key = entry.key();
        let current = self.board.get(&key).await;
        self.release(&key, current).await;
        self.queue.generate(entry).await
    }

    /// Explicit reset to `idle`: stops polling, drops any queued entry,
    /// invalidates in-flight results and asks the provider to cancel.
    pub async fn reset(&self, key: &JobKey) {
        let previous = self.board.reset(key).await;
        self.release(key, previous).await;
    }

    /// Forget an entity that no longer exists. Same cleanup as
    /// [`Self::reset`], but the job record is removed. Returns the state
    /// it had before.
    pub async fn forget(&self, key: &JobKey) -> Option<JobState> {
        let previous = self.board.reset(key).await;
        self.release(key, previous.clone()).await;
        self.board.remove(key).await;
        previous
    }

    /// Number of provider tasks currently being polled.
    pub async fn active_pollers(&self) -> usize {
        self.reconciler.active_count().await
    }

    /// `true` once every key has a terminal status.
    pub async fn all_settled(&self, keys: &[JobKey]) -> bool {
        for key in keys {
            if !self.board.status(key).await.is_some_and(JobStatus::is_terminal) {
                return false;
            }
        }
        true
    }

    /// Stop the ticker and every poller, then give in-flight artifact
    /// hand-offs a bounded chance to finish. Queued entries are discarded.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down orchestrator");
        self.queue.shutdown().await;
        self.reconciler.shutdown().await;
        self.handoff.drain(PERSIST_GRACE).await;
        tracing::info!("Orchestrator shut down complete");
    }

    // ---- private helpers ----

    /// Stop polling, drop the queued entry and cancel the provider task
    /// `state` was waiting on.
    async fn release(&self, key: &JobKey, state: Option<JobState>) {
        self.reconciler.stop_polling(key).await;
        self.queue.dequeue(key).await;

        let Some(state) = state else {
            return;
        };
        let (JobStatus::Queueing, Some(task_handle), Some(provider_name)) =
            (state.status, &state.task_handle, &state.provider)
        else {
            return;
        };
        let Some(provider) = self.registry.get(provider_name) else {
            return;
        };
        match provider.cancel(task_handle).await {
            Ok(()) => tracing::info!(job = %key, task_handle = %task_handle, "Provider task cancelled"),
            Err(e) => tracing::debug!(
                job = %key,
                task_handle = %task_handle,
                error = %e,
                "Best-effort provider cancel failed",
            ),
        }
    }
}
