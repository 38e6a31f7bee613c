//! Client-side generation job orchestration.
//!
//! [`Orchestrator`] owns the three moving parts:
//!
//! - [`JobBoard`]: the per-entity, per-kind [`JobState`] map, with every
//!   mutation guarded against stale attempts.
//! - [`JobQueue`]: a FIFO that dispatches one entry per tick so a batch of
//!   scenes does not hit the provider's rate limits all at once.
//! - [`Reconciler`]: one polling task per queued provider job, resolving it
//!   to `succeeded` or `failed`.
//!
//! Successful artifacts are handed to an [`ArtifactSink`] (normally the
//! asset store API) and the resulting version is recorded on the job.
//!
//! [`JobState`]: scenegen_core::job::JobState

pub mod board;
pub mod config;
pub mod events;
pub mod handoff;
pub mod orchestrator;
pub mod queue;
pub mod reconciler;
pub mod registry;
pub mod sink;

pub use board::JobBoard;
pub use config::{AssetStoreSettings, OrchestratorConfig, PollConfig, ProviderSettings};
pub use events::JobEvent;
pub use orchestrator::Orchestrator;
pub use queue::{JobQueue, QueueEntry};
pub use reconciler::{PollTarget, Reconciler};
pub use registry::ProviderRegistry;
pub use sink::{ArtifactRecord, ArtifactSink, AssetStoreClient, SinkError};
