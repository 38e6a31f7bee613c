//! Per-task polling loop.
//!
//! One task per queued provider job. Each poller checks immediately, then
//! every `interval + rand(0..=jitter)`, until the provider reports a terminal
//! status, the job stops waiting on this task (reset, newer dispatch), the
//! poll timeout expires, or the poller is cancelled.
//!
//! Each status check is classified exactly once:
//!
//! | Check result | Outcome |
//! |---|---|
//! | pending, unknown status, network error, 404/429/5xx, request timeout | keep polling |
//! | succeeded with an artifact | `succeeded`, artifact handed off, stop |
//! | failed / cancelled, other HTTP errors, malformed body | `failed`, stop |

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use scenegen_core::asset::ArtifactRef;
use scenegen_core::job::JobKey;
use scenegen_providers::{GenerationProvider, ProviderError, ProviderStatus};

use crate::board::JobBoard;
use crate::config::PollConfig;
use crate::handoff::Handoff;

/// How long [`Reconciler::shutdown`] waits for each poller to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A provider task to watch.
#[derive(Clone)]
pub struct PollTarget {
    pub key: JobKey,
    pub provider: Arc<dyn GenerationProvider>,
    pub task_handle: String,
    /// Dispatch attempt that obtained `task_handle`.
    pub attempt: u64,
    /// Provenance forwarded with the artifact.
    pub metadata: serde_json::Value,
}

/// What a single status check means for the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Continue { reason: Option<String> },
    Succeeded { artifact_url: String },
    Failed { reason: String },
}

/// Classify one bounded status check. `None` means the request timed out.
pub fn classify(result: Option<Result<ProviderStatus, ProviderError>>) -> PollOutcome {
    match result {
        None => PollOutcome::Continue {
            reason: Some("status request timed out".into()),
        },
        Some(Err(e)) if e.is_transient() => PollOutcome::Continue {
            reason: Some(e.to_string()),
        },
        Some(Err(e)) => PollOutcome::Failed {
            reason: e.to_string(),
        },
        Some(Ok(ProviderStatus::Pending)) => PollOutcome::Continue { reason: None },
        Some(Ok(ProviderStatus::Transient { reason })) => PollOutcome::Continue {
            reason: Some(reason),
        },
        Some(Ok(ProviderStatus::Succeeded { artifact_url })) => {
            PollOutcome::Succeeded { artifact_url }
        }
        Some(Ok(ProviderStatus::Failed { reason })) => PollOutcome::Failed { reason },
    }
}

/// Delay before the next check: `interval` plus up to `jitter`.
pub fn next_delay(config: &PollConfig) -> Duration {
    let jitter_ms = config.jitter.as_millis() as u64;
    let extra = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_ms)
    };
    config.interval + Duration::from_millis(extra)
}

struct ManagedPoller {
    id: u64,
    attempt: u64,
    task_handle: String,
    /// Child of the reconciler's master token.
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

pub struct Reconciler {
    board: Arc<JobBoard>,
    handoff: Handoff,
    config: PollConfig,
    pollers: RwLock<HashMap<JobKey, ManagedPoller>>,
    next_id: AtomicU64,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(board: Arc<JobBoard>, handoff: Handoff, config: PollConfig) -> Arc<Self> {
        Arc::new(Self {
            board,
            handoff,
            config,
            pollers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        })
    }

    /// Start watching a task. No-op (returns `false`) if the key already has
    /// a poller for this or a newer attempt, or the reconciler is shut down.
    pub async fn start_polling(self: &Arc<Self>, target: PollTarget) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let mut pollers = self.pollers.write().await;
        if let Some(existing) = pollers.get(&target.key) {
            if existing.attempt >= target.attempt {
                tracing::debug!(job = %target.key, "Poller already running");
                return false;
            }
            // Left over from an attempt the job has moved past.
            existing.cancel.cancel();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.cancel.child_token();
        let key = target.key.clone();
        let task_handle = target.task_handle.clone();
        let attempt = target.attempt;

        tracing::info!(
            job = %key,
            provider = target.provider.name(),
            task_handle = %task_handle,
            attempt,
            "Polling started",
        );

        let this = Arc::clone(self);
        let token = cancel.clone();
        let join = tokio::spawn(async move { this.run(id, target, token).await });

        pollers.insert(
            key,
            ManagedPoller {
                id,
                attempt,
                task_handle,
                cancel,
                join,
            },
        );
        true
    }

    /// Stop the poller for `key`, aborting its in-flight request. Returns
    /// whether a poller existed.
    pub async fn stop_polling(&self, key: &JobKey) -> bool {
        let Some(poller) = self.pollers.write().await.remove(key) else {
            return false;
        };
        poller.cancel.cancel();
        tracing::info!(job = %key, task_handle = %poller.task_handle, "Polling stopped");
        true
    }

    pub async fn is_polling(&self, key: &JobKey) -> bool {
        self.pollers.read().await.contains_key(key)
    }

    pub async fn active_count(&self) -> usize {
        self.pollers.read().await.len()
    }

    /// Cancel every poller and wait up to 5 seconds per task for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let drained: Vec<_> = self.pollers.write().await.drain().collect();
        for (key, poller) in drained {
            tracing::debug!(job = %key, "Stopping poller");
            poller.cancel.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, poller.join).await;
        }
    }

    // ---- private helpers ----

    async fn run(self: Arc<Self>, id: u64, target: PollTarget, cancel: CancellationToken) {
        let started = Instant::now();
        let mut checks = 0u32;

        loop {
            if checks > 0 {
                let delay = next_delay(&self.config);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            checks += 1;

            if !self
                .board
                .awaits_task(&target.key, target.attempt, &target.task_handle)
                .await
            {
                tracing::debug!(job = %target.key, "Job no longer waits on this task");
                break;
            }

            if started.elapsed() >= self.config.timeout {
                self.time_out(&target).await;
                break;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = tokio::time::timeout(
                    self.config.interval,
                    target.provider.poll_status(&target.task_handle),
                ) => r.ok(),
            };

            match classify(result) {
                PollOutcome::Continue { reason } => {
                    if let Some(reason) = reason {
                        tracing::debug!(
                            job = %target.key,
                            task_handle = %target.task_handle,
                            check = checks,
                            reason = %reason,
                            "Transient poll result, retrying",
                        );
                    }
                }
                PollOutcome::Succeeded { artifact_url } => {
                    self.handoff
                        .succeed(
                            &target.key,
                            target.attempt,
                            ArtifactRef::new(artifact_url),
                            target.metadata.clone(),
                        )
                        .await;
                    break;
                }
                PollOutcome::Failed { reason } => {
                    self.handoff.fail(&target.key, target.attempt, &reason).await;
                    break;
                }
            }
        }

        self.forget(&target.key, id).await;
    }

    async fn time_out(&self, target: &PollTarget) {
        let reason = format!(
            "Timed out after {}s waiting for provider '{}'",
            self.config.timeout.as_secs(),
            target.provider.name(),
        );
        if self.handoff.fail(&target.key, target.attempt, &reason).await {
            if let Err(e) = target.provider.cancel(&target.task_handle).await {
                tracing::debug!(
                    job = %target.key,
                    task_handle = %target.task_handle,
                    error = %e,
                    "Best-effort cancel after timeout failed",
                );
            }
        }
    }

    /// Remove the bookkeeping entry if it still belongs to poller `id`.
    async fn forget(&self, key: &JobKey, id: u64) {
        let mut pollers = self.pollers.write().await;
        if pollers.get(key).is_some_and(|p| p.id == id) {
            pollers.remove(key);
        }
    }
}
