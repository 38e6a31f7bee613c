//! Job lifecycle events.
//!
//! Every accepted state change on the [`JobBoard`](crate::JobBoard) is
//! broadcast so hosts can refresh their view without polling the board.

use serde::Serialize;
use scenegen_core::job::{JobKey, JobStatus, PersistedAsset};

/// Broadcast channel capacity for job events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub enum JobEvent {
    /// A job moved to a new status.
    StatusChanged {
        key: JobKey,
        status: JobStatus,
        attempt: u64,
        /// Failure cause when `status` is `failed`.
        error: Option<String>,
    },

    /// The artifact of a succeeded job was recorded by the asset store.
    AssetPersisted {
        key: JobKey,
        attempt: u64,
        asset: PersistedAsset,
    },

    /// The asset store rejected the artifact. The job stays `succeeded`.
    PersistFailed {
        key: JobKey,
        attempt: u64,
        error: String,
    },
}

impl JobEvent {
    pub fn key(&self) -> &JobKey {
        match self {
            Self::StatusChanged { key, .. }
            | Self::AssetPersisted { key, .. }
            | Self::PersistFailed { key, .. } => key,
        }
    }
}
