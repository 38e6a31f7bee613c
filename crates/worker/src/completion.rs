//! Tracks which manifest jobs are still outstanding.
//!
//! A job is finished once it failed, or once it succeeded and (when an
//! asset store is configured) the store answered for its artifact.

use std::collections::HashSet;

use scenegen_core::job::{JobKey, JobState, JobStatus};
use scenegen_orchestrator::JobEvent;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub persisted: usize,
    pub persist_failed: usize,
}

pub struct Completion {
    pending: HashSet<JobKey>,
    await_persistence: bool,
    summary: Summary,
}

impl Completion {
    pub fn new(keys: impl IntoIterator<Item = JobKey>, await_persistence: bool) -> Self {
        Self {
            pending: keys.into_iter().collect(),
            await_persistence,
            summary: Summary::default(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_keys(&self) -> Vec<JobKey> {
        self.pending.iter().cloned().collect()
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Apply a broadcast event.
    pub fn observe(&mut self, event: &JobEvent) {
        match event {
            JobEvent::StatusChanged {
                key,
                status: JobStatus::Failed,
                ..
            } => {
                if self.finish(key) {
                    self.summary.failed += 1;
                }
            }
            JobEvent::StatusChanged {
                key,
                status: JobStatus::Succeeded,
                ..
            } if !self.await_persistence => {
                if self.finish(key) {
                    self.summary.succeeded += 1;
                }
            }
            JobEvent::AssetPersisted { key, .. } => {
                if self.finish(key) {
                    self.summary.succeeded += 1;
                    self.summary.persisted += 1;
                }
            }
            JobEvent::PersistFailed { key, .. } => {
                if self.finish(key) {
                    self.summary.succeeded += 1;
                    self.summary.persist_failed += 1;
                }
            }
            JobEvent::StatusChanged { .. } => {}
        }
    }

    /// Catch up from the board after missed events.
    pub fn reconcile(&mut self, key: &JobKey, state: Option<&JobState>) {
        let Some(state) = state else {
            return;
        };
        match state.status {
            JobStatus::Failed => {
                if self.finish(key) {
                    self.summary.failed += 1;
                }
            }
            JobStatus::Succeeded if state.asset.is_some() => {
                if self.finish(key) {
                    self.summary.succeeded += 1;
                    self.summary.persisted += 1;
                }
            }
            JobStatus::Succeeded if state.persist_error.is_some() => {
                if self.finish(key) {
                    self.summary.succeeded += 1;
                    self.summary.persist_failed += 1;
                }
            }
            JobStatus::Succeeded if !self.await_persistence => {
                if self.finish(key) {
                    self.summary.succeeded += 1;
                }
            }
            _ => {}
        }
    }

    fn finish(&mut self, key: &JobKey) -> bool {
        self.pending.remove(key)
    }
}
