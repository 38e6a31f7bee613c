//! Shared fakes for orchestrator integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use scenegen_core::asset::{ArtifactRef, AssetKind};
use scenegen_core::job::{JobKey, JobStatus, PersistedAsset};
use scenegen_orchestrator::{
    ArtifactRecord, ArtifactSink, Orchestrator, OrchestratorConfig, PollConfig, ProviderRegistry,
    QueueEntry, SinkError,
};
use scenegen_providers::{
    GenerationProvider, GenerationRequest, ProviderError, ProviderStatus, Submission,
};

// ---------------------------------------------------------------------------
// Scripted provider
// ---------------------------------------------------------------------------

/// What the next `submit` for a prompt returns.
#[derive(Debug, Clone)]
pub enum SubmitScript {
    Accept(String),
    AcceptAfter(String, Duration),
    Complete(String),
    HttpError(u16),
    Reject(String),
}

/// What the next status check for a handle returns.
#[derive(Debug, Clone)]
pub enum PollScript {
    Pending,
    Succeed(String),
    Fail(String),
    /// Answers `Failed` once `Duration` has passed.
    FailAfter(String, Duration),
    HttpError(u16),
}

#[derive(Default)]
struct Script {
    submits: HashMap<String, VecDeque<SubmitScript>>,
    polls: HashMap<String, VecDeque<PollScript>>,
}

/// In-memory provider driven by per-prompt and per-handle scripts.
///
/// Unscripted submits are accepted as `task-<prompt>`; unscripted polls
/// report pending.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<Script>,
    pub submitted: Mutex<Vec<(String, Instant)>>,
    pub polled: Mutex<Vec<(String, Instant)>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(Script::default()),
            submitted: Mutex::new(Vec::new()),
            polled: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        })
    }

    pub fn on_submit(&self, prompt: &str, steps: impl IntoIterator<Item = SubmitScript>) {
        self.script
            .lock()
            .unwrap()
            .submits
            .entry(prompt.to_string())
            .or_default()
            .extend(steps);
    }

    pub fn on_poll(&self, handle: &str, steps: impl IntoIterator<Item = PollScript>) {
        self.script
            .lock()
            .unwrap()
            .polls
            .entry(handle.to_string())
            .or_default()
            .extend(steps);
    }

    pub fn submitted_prompts(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn polls_for(&self, handle: &str) -> usize {
        self.polled
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == handle)
            .count()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        self.submitted
            .lock()
            .unwrap()
            .push((request.prompt.clone(), Instant::now()));

        let step = self
            .script
            .lock()
            .unwrap()
            .submits
            .get_mut(&request.prompt)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| SubmitScript::Accept(format!("task-{}", request.prompt)));

        match step {
            SubmitScript::Accept(task_handle) => Ok(Submission::Accepted { task_handle }),
            SubmitScript::AcceptAfter(task_handle, delay) => {
                tokio::time::sleep(delay).await;
                Ok(Submission::Accepted { task_handle })
            }
            SubmitScript::Complete(url) => Ok(Submission::Completed {
                artifact: ArtifactRef::new(url),
            }),
            SubmitScript::HttpError(status) => Err(ProviderError::Api {
                status,
                body: "scripted".into(),
            }),
            SubmitScript::Reject(reason) => Err(ProviderError::Rejected(reason)),
        }
    }

    async fn poll_status(&self, task_handle: &str) -> Result<ProviderStatus, ProviderError> {
        self.polled
            .lock()
            .unwrap()
            .push((task_handle.to_string(), Instant::now()));

        let step = self
            .script
            .lock()
            .unwrap()
            .polls
            .get_mut(task_handle)
            .and_then(VecDeque::pop_front)
            .unwrap_or(PollScript::Pending);

        match step {
            PollScript::Pending => Ok(ProviderStatus::Pending),
            PollScript::Succeed(artifact_url) => Ok(ProviderStatus::Succeeded { artifact_url }),
            PollScript::Fail(reason) => Ok(ProviderStatus::Failed { reason }),
            PollScript::FailAfter(reason, delay) => {
                tokio::time::sleep(delay).await;
                Ok(ProviderStatus::Failed { reason })
            }
            PollScript::HttpError(status) => Err(ProviderError::Api {
                status,
                body: "scripted".into(),
            }),
        }
    }

    async fn cancel(&self, task_handle: &str) -> Result<(), ProviderError> {
        self.cancelled.lock().unwrap().push(task_handle.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<ArtifactRecord>>,
    delay: Option<Duration>,
    reject: Option<String>,
}

impl MemorySink {
    /// A sink that takes `delay` to answer each request.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// A sink that answers every request with a 500.
    pub fn rejecting(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reject: Some(message.to_string()),
            ..Self::default()
        })
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn persist(&self, record: &ArtifactRecord) -> Result<PersistedAsset, SinkError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.reject {
            return Err(SinkError::Rejected {
                status: 500,
                code: "INSERT_FAILED".into(),
                message: message.clone(),
            });
        }
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        let version = records
            .iter()
            .filter(|r| r.key == record.key)
            .count() as i32;
        Ok(PersistedAsset {
            asset_id: records.len() as i64,
            version,
            storage_url: format!("file://assets/{}/v{version}", record.key),
        })
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        dispatch_interval: Duration::from_millis(500),
        dispatch_retry_limit: 2,
        poll: PollConfig {
            interval: Duration::from_secs(1),
            jitter: Duration::ZERO,
            timeout: Duration::from_secs(60),
        },
        ..OrchestratorConfig::default()
    }
}

pub fn build(
    config: &OrchestratorConfig,
    provider: &Arc<ScriptedProvider>,
    sink: Option<Arc<MemorySink>>,
) -> Orchestrator {
    let mut registry = ProviderRegistry::new();
    registry.register(provider.clone(), &AssetKind::ALL);
    let sink = sink.map(|s| s as Arc<dyn ArtifactSink>);
    Orchestrator::new(config, registry, sink)
}

pub fn clip(entity: &str, prompt: &str) -> QueueEntry {
    QueueEntry::new(entity, GenerationRequest::new(AssetKind::Clip, prompt))
}

pub fn clip_key(entity: &str) -> JobKey {
    JobKey::new(entity, AssetKind::Clip)
}

pub async fn status(orchestrator: &Orchestrator, key: &JobKey) -> Option<JobStatus> {
    orchestrator.state(key).await.map(|s| s.status)
}
