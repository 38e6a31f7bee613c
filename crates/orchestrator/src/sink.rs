//! Hand-off of finished artifacts to the versioned asset store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use scenegen_core::asset::ArtifactRef;
use scenegen_core::job::{JobKey, PersistedAsset};
use scenegen_core::types::DbId;

use crate::config::AssetStoreSettings;

/// A finished artifact and what produced it.
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub key: JobKey,
    pub artifact: ArtifactRef,
    /// Provenance stored next to the asset (provider, prompt, task handle).
    pub metadata: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The asset store answered with a structured error.
    #[error("Asset store error ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },
}

/// Destination for succeeded artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn persist(&self, record: &ArtifactRecord) -> Result<PersistedAsset, SinkError>;
}

// ---------------------------------------------------------------------------
// HTTP client for `POST /api/v1/assets`
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateAssetBody<'a> {
    parent_id: &'a str,
    kind: scenegen_core::asset::AssetKind,
    owner_id: DbId,
    source: &'a str,
    metadata: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct CreatedAsset {
    asset_id: DbId,
    version: i32,
    storage_url: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
}

/// [`ArtifactSink`] backed by the asset store HTTP API.
pub struct AssetStoreClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    owner_id: DbId,
}

impl AssetStoreClient {
    pub fn new(client: reqwest::Client, settings: &AssetStoreSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            owner_id: settings.owner_id,
        }
    }
}

#[async_trait]
impl ArtifactSink for AssetStoreClient {
    async fn persist(&self, record: &ArtifactRecord) -> Result<PersistedAsset, SinkError> {
        let body = CreateAssetBody {
            parent_id: record.key.entity_id.as_str(),
            kind: record.key.kind,
            owner_id: self.owner_id,
            source: record.artifact.as_str(),
            metadata: &record.metadata,
        };

        let response = self
            .client
            .post(format!("{}/api/v1/assets", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let err: ErrorBody = response.json().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                code: err.code,
                message: err.error,
            });
        }

        let created: DataEnvelope<CreatedAsset> = response.json().await?;
        Ok(PersistedAsset {
            asset_id: created.data.asset_id,
            version: created.data.version,
            storage_url: created.data.storage_url,
        })
    }
}
