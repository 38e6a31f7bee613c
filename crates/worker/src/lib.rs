//! Batch worker: runs an orchestrator over a manifest of jobs until every
//! job has settled.

pub mod completion;
pub mod manifest;

use scenegen_core::config::ConfigError;
use scenegen_providers::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to read manifest {path}: {source}")]
    ManifestRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid manifest {path}: {source}")]
    ManifestFormat {
        path: String,
        source: serde_json::Error,
    },
}
