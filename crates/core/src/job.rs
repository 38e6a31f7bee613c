//! Generation job state machine.
//!
//! ```text
//! (none) | idle | succeeded | failed ──▶ pending
//! pending  ──▶ queueing | succeeded | failed
//! queueing ──▶ succeeded | failed
//! any      ──▶ idle            (explicit reset)
//! ```
//!
//! Every dispatch and every reset bumps [`JobState::attempt`]. Results from
//! asynchronous work carry the attempt they were started for and are
//! rejected with [`TransitionError::Stale`] once the entity has moved on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::asset::{ArtifactRef, AssetKind};
use crate::types::{DbId, EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Identifies one job slot: an entity and the kind of artifact generated
/// for it. A scene has independent image and clip jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub entity_id: EntityId,
    pub kind: AssetKind,
}

impl JobKey {
    pub fn new(entity_id: impl Into<EntityId>, kind: AssetKind) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_id, self.kind)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Explicitly reset by the user.
    Idle,
    /// Local dispatch in flight; no provider handle yet.
    Pending,
    /// Provider accepted the job; waiting for it to finish.
    Queueing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Queueing => "queueing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// States in which a new enqueue is a no-op.
    pub fn blocks_enqueue(self) -> bool {
        matches!(self, Self::Pending | Self::Queueing | Self::Succeeded)
    }

    /// Check if a transition from this state to `target` is valid.
    pub fn can_transition_to(self, target: JobStatus) -> bool {
        match (self, target) {
            (_, Self::Idle) => true,
            (Self::Idle | Self::Succeeded | Self::Failed, Self::Pending) => true,
            (Self::Pending, Self::Queueing | Self::Succeeded | Self::Failed) => true,
            (Self::Queueing, Self::Succeeded | Self::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Persisted asset summary
// ---------------------------------------------------------------------------

/// What the asset store reported after recording an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAsset {
    pub asset_id: DbId,
    pub version: i32,
    pub storage_url: String,
}

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Why a state change was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The result belongs to an older dispatch of this entity.
    #[error("stale result for attempt {result_attempt} (current attempt {current_attempt})")]
    Stale {
        result_attempt: u64,
        current_attempt: u64,
    },

    #[error("invalid transition {from} -> {to}")]
    Invalid { from: JobStatus, to: JobStatus },

    /// Nothing has been recorded for the job yet.
    #[error("no job state recorded")]
    Missing,
}

/// Per-entity, per-kind job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    pub task_handle: Option<String>,
    pub artifact: Option<ArtifactRef>,
    /// Present only while `status == Failed`.
    pub error: Option<String>,
    pub provider: Option<String>,
    pub attempt: u64,
    pub asset: Option<PersistedAsset>,
    /// Why the asset store rejected the artifact of a succeeded job.
    #[serde(default)]
    pub persist_error: Option<String>,
    pub updated_at: Timestamp,
}

impl JobState {
    /// Record for a job that was reset before it was ever dispatched.
    pub fn idle() -> Self {
        Self {
            status: JobStatus::Idle,
            task_handle: None,
            artifact: None,
            error: None,
            provider: None,
            attempt: 0,
            asset: None,
            persist_error: None,
            updated_at: chrono::Utc::now(),
        }
    }

    /// State for a fresh dispatch following `previous` (if any).
    pub fn dispatched(previous: Option<&JobState>, provider: &str) -> Self {
        Self {
            status: JobStatus::Pending,
            task_handle: None,
            artifact: None,
            error: None,
            provider: Some(provider.to_string()),
            attempt: previous.map_or(1, |p| p.attempt + 1),
            asset: None,
            persist_error: None,
            updated_at: chrono::Utc::now(),
        }
    }

    /// `true` if this record was produced by dispatch `attempt`.
    pub fn is_attempt(&self, attempt: u64) -> bool {
        self.attempt == attempt
    }

    /// `true` while a poller for `task_handle` should keep running.
    pub fn awaits_task(&self, attempt: u64, task_handle: &str) -> bool {
        self.status == JobStatus::Queueing
            && self.attempt == attempt
            && self.task_handle.as_deref() == Some(task_handle)
    }

    /// pending -> queueing.
    pub fn mark_queueing(&mut self, attempt: u64, task_handle: &str) -> Result<(), TransitionError> {
        self.guard(attempt, JobStatus::Queueing)?;
        self.status = JobStatus::Queueing;
        self.task_handle = Some(task_handle.to_string());
        self.touch();
        Ok(())
    }

    /// pending | queueing -> succeeded.
    pub fn mark_succeeded(
        &mut self,
        attempt: u64,
        artifact: ArtifactRef,
    ) -> Result<(), TransitionError> {
        self.guard(attempt, JobStatus::Succeeded)?;
        self.status = JobStatus::Succeeded;
        self.artifact = Some(artifact);
        self.error = None;
        self.touch();
        Ok(())
    }

    /// pending | queueing -> failed. A succeeded job is never downgraded.
    pub fn mark_failed(&mut self, attempt: u64, reason: &str) -> Result<(), TransitionError> {
        self.guard(attempt, JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error = Some(reason.to_string());
        self.touch();
        Ok(())
    }

    /// Record the asset the store created for the artifact of `attempt`.
    pub fn record_asset(
        &mut self,
        attempt: u64,
        asset: PersistedAsset,
    ) -> Result<(), TransitionError> {
        self.guard_succeeded(attempt)?;
        self.asset = Some(asset);
        self.persist_error = None;
        self.touch();
        Ok(())
    }

    /// Record that the store rejected the artifact of `attempt`. The job
    /// stays `succeeded`.
    pub fn record_persist_failure(
        &mut self,
        attempt: u64,
        reason: &str,
    ) -> Result<(), TransitionError> {
        self.guard_succeeded(attempt)?;
        self.persist_error = Some(reason.to_string());
        self.touch();
        Ok(())
    }

    /// Explicit reset. Invalidates every in-flight result.
    pub fn reset_idle(&mut self) {
        self.status = JobStatus::Idle;
        self.task_handle = None;
        self.artifact = None;
        self.error = None;
        self.asset = None;
        self.persist_error = None;
        self.attempt += 1;
        self.touch();
    }

    fn guard(&self, attempt: u64, to: JobStatus) -> Result<(), TransitionError> {
        if self.attempt != attempt {
            return Err(self.stale(attempt));
        }
        if !self.status.can_transition_to(to) {
            return Err(TransitionError::Invalid {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn guard_succeeded(&self, attempt: u64) -> Result<(), TransitionError> {
        if self.attempt != attempt {
            return Err(self.stale(attempt));
        }
        if self.status != JobStatus::Succeeded {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: JobStatus::Succeeded,
            });
        }
        Ok(())
    }

    fn stale(&self, attempt: u64) -> TransitionError {
        TransitionError::Stale {
            result_attempt: attempt,
            current_attempt: self.attempt,
        }
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}
