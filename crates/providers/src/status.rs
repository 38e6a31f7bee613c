//! Provider status vocabularies and their normalisation.
//!
//! Two vocabularies exist in the wild:
//!
//! | Task dialect | Prediction dialect | Normalised |
//! |---|---|---|
//! | `PENDING`, `THROTTLED`, `RUNNING` | `starting`, `processing` | [`ProviderStatus::Pending`] |
//! | `SUCCEEDED` | `succeeded` | [`ProviderStatus::Succeeded`] |
//! | `FAILED`, `CANCELLED` | `failed`, `canceled` | [`ProviderStatus::Failed`] |
//! | anything else | anything else | [`ProviderStatus::Transient`] |

use serde::Deserialize;

/// Provider-independent job status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    /// Not finished yet.
    Pending,
    /// Finished; the artifact can be fetched from `artifact_url`.
    Succeeded { artifact_url: String },
    /// Finished without an artifact. Final.
    Failed { reason: String },
    /// The status could not be determined this time; ask again later.
    Transient { reason: String },
}

// ---------------------------------------------------------------------------
// Task dialect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Throttled,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// Body of `POST /v1/tasks` and `GET /v1/tasks/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskBody {
    pub id: Option<String>,
    pub status: Option<TaskState>,
    #[serde(default)]
    pub output: Vec<String>,
    pub failure: Option<String>,
}

impl TaskBody {
    pub fn normalize(&self) -> ProviderStatus {
        match self.status {
            Some(TaskState::Pending | TaskState::Throttled | TaskState::Running) => {
                ProviderStatus::Pending
            }
            Some(TaskState::Succeeded) => succeeded(self.output.first().cloned()),
            Some(TaskState::Failed) => ProviderStatus::Failed {
                reason: self
                    .failure
                    .clone()
                    .unwrap_or_else(|| "Task failed without a reason".to_string()),
            },
            Some(TaskState::Cancelled) => ProviderStatus::Failed {
                reason: "Task was cancelled by the provider".to_string(),
            },
            Some(TaskState::Unknown) | None => ProviderStatus::Transient {
                reason: "Unrecognised task status".to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Prediction dialect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionState {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

/// `output` is a single URL for image models and a list for video models.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    One(String),
    Many(Vec<String>),
    Other(serde_json::Value),
}

impl PredictionOutput {
    fn first(&self) -> Option<String> {
        match self {
            Self::One(url) => Some(url.clone()),
            Self::Many(urls) => urls.first().cloned(),
            Self::Other(_) => None,
        }
    }
}

/// Body of `POST /v1/predictions` and `GET /v1/predictions/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionBody {
    pub id: Option<String>,
    pub status: Option<PredictionState>,
    pub output: Option<PredictionOutput>,
    pub error: Option<serde_json::Value>,
}

impl PredictionBody {
    pub fn normalize(&self) -> ProviderStatus {
        match self.status {
            Some(PredictionState::Starting | PredictionState::Processing) => ProviderStatus::Pending,
            Some(PredictionState::Succeeded) => {
                succeeded(self.output.as_ref().and_then(PredictionOutput::first))
            }
            Some(PredictionState::Failed) => ProviderStatus::Failed {
                reason: self
                    .error_text()
                    .unwrap_or_else(|| "Prediction failed without a reason".to_string()),
            },
            Some(PredictionState::Canceled) => ProviderStatus::Failed {
                reason: "Prediction was cancelled by the provider".to_string(),
            },
            Some(PredictionState::Unknown) | None => ProviderStatus::Transient {
                reason: "Unrecognised prediction status".to_string(),
            },
        }
    }

    fn error_text(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

fn succeeded(artifact_url: Option<String>) -> ProviderStatus {
    match artifact_url {
        Some(artifact_url) if !artifact_url.is_empty() => ProviderStatus::Succeeded { artifact_url },
        _ => ProviderStatus::Failed {
            reason: "Provider reported success without an artifact".to_string(),
        },
    }
}
