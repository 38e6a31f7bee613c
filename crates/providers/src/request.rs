use scenegen_core::asset::{ArtifactRef, AssetKind};
use serde::{Deserialize, Serialize};

/// What to generate for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: AssetKind,
    pub prompt: String,
    /// Reference image the provider conditions on (image-to-video, edits).
    #[serde(default)]
    pub reference_url: Option<String>,
    /// Provider-specific knobs (dimensions, duration, seed, ...), passed
    /// through verbatim.
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl GenerationRequest {
    pub fn new(kind: AssetKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            reference_url: None,
            options: serde_json::Map::new(),
        }
    }

    pub fn with_reference(mut self, url: impl Into<String>) -> Self {
        self.reference_url = Some(url.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The provider answered synchronously with the finished artifact.
    Completed { artifact: ArtifactRef },
    /// The provider queued the job; poll `task_handle` for completion.
    Accepted { task_handle: String },
}
