//! Terminal outcomes shared by the dispatcher and the reconciler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use scenegen_core::asset::ArtifactRef;
use scenegen_core::job::{JobKey, TransitionError};

use crate::board::JobBoard;
use crate::sink::{ArtifactRecord, ArtifactSink};

/// Writes terminal results to the board and forwards artifacts to the sink.
#[derive(Clone)]
pub struct Handoff {
    board: Arc<JobBoard>,
    sink: Option<Arc<dyn ArtifactSink>>,
    /// Sink calls still in flight.
    persists: Arc<Mutex<JoinSet<()>>>,
}

impl Handoff {
    pub fn new(board: Arc<JobBoard>, sink: Option<Arc<dyn ArtifactSink>>) -> Self {
        Self {
            board,
            sink,
            persists: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Mark the job succeeded and hand its artifact to the sink in the
    /// background. Returns `false` if the result was stale and discarded.
    pub async fn succeed(
        &self,
        key: &JobKey,
        attempt: u64,
        artifact: ArtifactRef,
        metadata: serde_json::Value,
    ) -> bool {
        if let Err(e) = self.board.mark_succeeded(key, attempt, artifact.clone()).await {
            log_discarded(key, attempt, &e);
            return false;
        }

        let Some(sink) = self.sink.clone() else {
            return true;
        };

        let record = ArtifactRecord {
            key: key.clone(),
            artifact,
            metadata,
        };
        let board = Arc::clone(&self.board);
        let mut persists = self.persists.lock().await;
        while persists.try_join_next().is_some() {}
        persists.spawn(persist(board, sink, record, attempt));
        true
    }

    /// Wait up to `grace` for hand-offs still talking to the sink.
    pub async fn drain(&self, grace: Duration) {
        let mut persists = std::mem::take(&mut *self.persists.lock().await);
        if persists.is_empty() {
            return;
        }
        tracing::debug!(in_flight = persists.len(), "Waiting for artifact hand-offs");
        let finished = tokio::time::timeout(grace, async {
            while persists.join_next().await.is_some() {}
        })
        .await;
        if finished.is_err() {
            tracing::warn!(abandoned = persists.len(), "Artifact hand-offs still running at shutdown");
            persists.abort_all();
        }
    }

    /// Mark the job failed. Returns `false` if the result was stale or the
    /// job already succeeded.
    pub async fn fail(&self, key: &JobKey, attempt: u64, reason: &str) -> bool {
        match self.board.mark_failed(key, attempt, reason).await {
            Ok(()) => true,
            Err(e) => {
                log_discarded(key, attempt, &e);
                false
            }
        }
    }
}

async fn persist(
    board: Arc<JobBoard>,
    sink: Arc<dyn ArtifactSink>,
    record: ArtifactRecord,
    attempt: u64,
) {
    let key = &record.key;
    match sink.persist(&record).await {
        Ok(asset) => {
            tracing::info!(
                job = %key,
                attempt,
                asset_id = asset.asset_id,
                version = asset.version,
                "Artifact persisted",
            );
            if let Err(e) = board.record_asset(key, attempt, asset).await {
                log_discarded(key, attempt, &e);
            }
        }
        Err(e) => {
            tracing::error!(job = %key, attempt, error = %e, "Failed to persist artifact");
            if let Err(e) = board.record_persist_failure(key, attempt, &e.to_string()).await {
                log_discarded(key, attempt, &e);
            }
        }
    }
}

fn log_discarded(key: &JobKey, attempt: u64, err: &TransitionError) {
    tracing::debug!(job = %key, attempt, reason = %err, "Discarding result");
}
