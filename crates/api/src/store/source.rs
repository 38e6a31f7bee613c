//! Resolving an artifact source (data URI or remote URL) into bytes.

use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use scenegen_core::asset::{decode_data_uri, normalize_mime};
use scenegen_core::error::CoreError;

use super::AssetStoreError;

/// Bytes of an artifact and what its origin said about them.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub bytes: Vec<u8>,
    /// MIME type from the data URI header or the `Content-Type` response header.
    pub declared_mime: Option<String>,
    /// Set for remote sources only.
    pub source_url: Option<String>,
}

/// Downloads remote artifacts with a single bounded `GET`; decodes inline ones.
#[derive(Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl SourceFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn fetch(&self, source: &str) -> Result<FetchedSource, AssetStoreError> {
        if source.starts_with("data:") {
            let payload = decode_data_uri(source)?;
            return Ok(FetchedSource {
                bytes: payload.bytes,
                declared_mime: payload.mime,
                source_url: None,
            });
        }

        if !(source.starts_with("http://") || source.starts_with("https://")) {
            return Err(CoreError::Validation(
                "source must be a data URI or an http(s) URL".into(),
            )
            .into());
        }

        let response = self
            .client
            .get(source)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AssetStoreError::Fetch(format!("GET {source} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssetStoreError::Fetch(format!(
                "GET {source} returned {status}"
            )));
        }

        let declared_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(normalize_mime)
            .filter(|m| !m.is_empty());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssetStoreError::Fetch(format!("reading body of {source} failed: {e}")))?;
        if bytes.is_empty() {
            return Err(AssetStoreError::Fetch(format!("{source} returned an empty body")));
        }

        tracing::debug!(source, size = bytes.len(), mime = ?declared_mime, "Fetched remote artifact");

        Ok(FetchedSource {
            bytes: bytes.to_vec(),
            declared_mime,
            source_url: Some(source.to_string()),
        })
    }
}
