//! Shared per-entity job state.
//!
//! The board is the single source of truth for [`JobState`]. Dispatch and
//! polling tasks never hold a `JobState` across an await; they re-read and
//! mutate it under the write lock, passing the attempt they were started
//! for, so a result that arrives after a reset or a newer dispatch is
//! rejected instead of overwriting fresher state.

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};
use scenegen_core::asset::ArtifactRef;
use scenegen_core::job::{JobKey, JobState, JobStatus, PersistedAsset, TransitionError};

use crate::events::{JobEvent, EVENT_CHANNEL_CAPACITY};

pub struct JobBoard {
    states: RwLock<HashMap<JobKey, JobState>>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl Default for JobBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBoard {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            states: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    pub async fn get(&self, key: &JobKey) -> Option<JobState> {
        self.states.read().await.get(key).cloned()
    }

    pub async fn status(&self, key: &JobKey) -> Option<JobStatus> {
        self.states.read().await.get(key).map(|s| s.status)
    }

    /// All recorded states, ordered by key.
    pub async fn snapshot(&self) -> Vec<(JobKey, JobState)> {
        let mut all: Vec<_> = self
            .states
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// `true` if the key's current status rejects a new enqueue.
    pub async fn blocks_enqueue(&self, key: &JobKey) -> bool {
        self.status(key)
            .await
            .is_some_and(JobStatus::blocks_enqueue)
    }

    /// `true` while `(attempt, task_handle)` is still what the job waits on.
    pub async fn awaits_task(&self, key: &JobKey, attempt: u64, task_handle: &str) -> bool {
        self.states
            .read()
            .await
            .get(key)
            .is_some_and(|s| s.awaits_task(attempt, task_handle))
    }

    /// Start a new attempt: the job becomes `pending` and every result from
    /// an earlier attempt becomes stale. Returns the new attempt number.
    pub async fn begin_dispatch(&self, key: &JobKey, provider: &str) -> u64 {
        let mut states = self.states.write().await;
        let next = JobState::dispatched(states.get(key), provider);
        let attempt = next.attempt;
        states.insert(key.clone(), next);
        drop(states);

        tracing::debug!(job = %key, attempt, provider, "Job pending");
        self.emit_status(key, JobStatus::Pending, attempt, None);
        attempt
    }

    pub async fn mark_queueing(
        &self,
        key: &JobKey,
        attempt: u64,
        task_handle: &str,
    ) -> Result<(), TransitionError> {
        self.update(key, |s| s.mark_queueing(attempt, task_handle))
            .await?;
        tracing::info!(job = %key, attempt, task_handle, "Job queued at provider");
        self.emit_status(key, JobStatus::Queueing, attempt, None);
        Ok(())
    }

    pub async fn mark_succeeded(
        &self,
        key: &JobKey,
        attempt: u64,
        artifact: ArtifactRef,
    ) -> Result<(), TransitionError> {
        let shown = artifact.to_string();
        self.update(key, |s| s.mark_succeeded(attempt, artifact))
            .await?;
        tracing::info!(job = %key, attempt, artifact = %shown, "Job succeeded");
        self.emit_status(key, JobStatus::Succeeded, attempt, None);
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        key: &JobKey,
        attempt: u64,
        reason: &str,
    ) -> Result<(), TransitionError> {
        self.update(key, |s| s.mark_failed(attempt, reason)).await?;
        tracing::warn!(job = %key, attempt, error = reason, "Job failed");
        self.emit_status(key, JobStatus::Failed, attempt, Some(reason.to_string()));
        Ok(())
    }

    pub async fn record_asset(
        &self,
        key: &JobKey,
        attempt: u64,
        asset: PersistedAsset,
    ) -> Result<(), TransitionError> {
        let event_asset = asset.clone();
        self.update(key, |s| s.record_asset(attempt, asset)).await?;
        let _ = self.event_tx.send(JobEvent::AssetPersisted {
            key: key.clone(),
            attempt,
            asset: event_asset,
        });
        Ok(())
    }

    /// Keep the store's rejection on the job so it survives missed events.
    pub async fn record_persist_failure(
        &self,
        key: &JobKey,
        attempt: u64,
        error: &str,
    ) -> Result<(), TransitionError> {
        self.update(key, |s| s.record_persist_failure(attempt, error))
            .await?;
        let _ = self.event_tx.send(JobEvent::PersistFailed {
            key: key.clone(),
            attempt,
            error: error.to_string(),
        });
        Ok(())
    }

    /// Explicit reset to `idle`. Returns the state it replaced, if any.
    pub async fn reset(&self, key: &JobKey) -> Option<JobState> {
        let mut states = self.states.write().await;
        let previous = states.get(key).cloned();
        let state = states.entry(key.clone()).or_insert_with(JobState::idle);
        if previous.is_some() {
            state.reset_idle();
        }
        let attempt = state.attempt;
        drop(states);

        tracing::info!(job = %key, attempt, "Job reset to idle");
        self.emit_status(key, JobStatus::Idle, attempt, None);
        previous
    }

    /// Drop a job entirely (its entity was deleted). Returns the removed state.
    pub async fn remove(&self, key: &JobKey) -> Option<JobState> {
        self.states.write().await.remove(key)
    }

    /// Restore a previously resolved state into a fresh board.
    ///
    /// Only terminal states are accepted, and an existing record is never
    /// replaced. Returns whether the state was stored.
    pub async fn seed(&self, key: JobKey, state: JobState) -> bool {
        if !state.status.is_terminal() {
            return false;
        }
        let mut states = self.states.write().await;
        if states.contains_key(&key) {
            return false;
        }
        states.insert(key, state);
        true
    }

    // ---- private helpers ----

    async fn update<F>(&self, key: &JobKey, apply: F) -> Result<(), TransitionError>
    where
        F: FnOnce(&mut JobState) -> Result<(), TransitionError>,
    {
        let mut states = self.states.write().await;
        let state = states.get_mut(key).ok_or(TransitionError::Missing)?;
        apply(state)
    }

    fn emit_status(&self, key: &JobKey, status: JobStatus, attempt: u64, error: Option<String>) {
        let _ = self.event_tx.send(JobEvent::StatusChanged {
            key: key.clone(),
            status,
            attempt,
            error,
        });
    }
}
