//! REST client for a generation provider.
//!
//! Wraps the provider HTTP API (submission, status polling, cancellation)
//! using [`reqwest`]. The endpoint layout and status vocabulary depend on
//! the provider's [`Dialect`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use scenegen_core::asset::ArtifactRef;
use scenegen_core::error::CoreError;
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::provider::GenerationProvider;
use crate::request::{GenerationRequest, Submission};
use crate::status::{PredictionBody, ProviderStatus, TaskBody};

/// Endpoint layout and status vocabulary of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `/v1/tasks`, uppercase statuses, `DELETE` to cancel.
    Task,
    /// `/v1/predictions`, lowercase statuses, `POST .../cancel` to cancel.
    Prediction,
}

impl FromStr for Dialect {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "task" | "tasks" => Ok(Self::Task),
            "prediction" | "predictions" => Ok(Self::Prediction),
            other => Err(CoreError::Validation(format!(
                "Unknown provider dialect '{other}'. Must be one of: task, prediction"
            ))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => f.write_str("task"),
            Self::Prediction => f.write_str("prediction"),
        }
    }
}

/// HTTP client for a single provider.
pub struct ProviderApi {
    name: String,
    dialect: Dialect,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ProviderApi {
    /// Create a new client.
    ///
    /// * `base_url` - e.g. `https://api.provider.example`, without a
    ///   trailing slash.
    pub fn new(
        name: impl Into<String>,
        dialect: Dialect,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self::with_client(reqwest::Client::new(), name, dialect, base_url, api_key)
    }

    /// Create a client reusing an existing [`reqwest::Client`] (connection
    /// pooling across providers).
    pub fn with_client(
        client: reqwest::Client,
        name: impl Into<String>,
        dialect: Dialect,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dialect,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    // ---- request bodies ----

    fn submit_body(&self, request: &GenerationRequest) -> serde_json::Value {
        match self.dialect {
            Dialect::Task => serde_json::json!({
                "prompt": request.prompt,
                "reference_url": request.reference_url,
                "kind": request.kind,
                "options": request.options,
            }),
            Dialect::Prediction => {
                let mut input = request.options.clone();
                input.insert("prompt".into(), request.prompt.clone().into());
                if let Some(reference) = &request.reference_url {
                    input.insert("image".into(), reference.clone().into());
                }
                serde_json::json!({ "input": input })
            }
        }
    }

    fn collection_url(&self) -> String {
        match self.dialect {
            Dialect::Task => format!("{}/v1/tasks", self.base_url),
            Dialect::Prediction => format!("{}/v1/predictions", self.base_url),
        }
    }

    fn item_url(&self, task_handle: &str) -> String {
        format!("{}/{}", self.collection_url(), task_handle)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the response
    /// unchanged on success, or a [`ProviderError::Api`] containing the
    /// status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::api(status.as_u16(), body));
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Turn a submission response into a [`Submission`].
///
/// A body that already reports success with an artifact completes the job
/// without polling; a terminal failure is a rejection; otherwise the body
/// must carry a task id.
fn interpret_submission(id: Option<String>, status: ProviderStatus) -> Result<Submission, ProviderError> {
    match status {
        ProviderStatus::Succeeded { artifact_url } => Ok(Submission::Completed {
            artifact: ArtifactRef::new(artifact_url),
        }),
        ProviderStatus::Failed { reason } => Err(ProviderError::Rejected(reason)),
        ProviderStatus::Pending | ProviderStatus::Transient { .. } => match id {
            Some(task_handle) if !task_handle.is_empty() => Ok(Submission::Accepted { task_handle }),
            _ => Err(ProviderError::Decode(
                "submission response carried neither an artifact nor a task id".into(),
            )),
        },
    }
}

#[async_trait]
impl GenerationProvider for ProviderApi {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let response = self
            .authorize(self.client.post(self.collection_url()))
            .json(&self.submit_body(request))
            .send()
            .await?;

        let submission = match self.dialect {
            Dialect::Task => {
                let body: TaskBody = Self::parse_response(response).await?;
                let status = body.normalize();
                interpret_submission(body.id, status)?
            }
            Dialect::Prediction => {
                let body: PredictionBody = Self::parse_response(response).await?;
                let status = body.normalize();
                interpret_submission(body.id, status)?
            }
        };

        tracing::debug!(
            provider = %self.name,
            dialect = %self.dialect,
            kind = %request.kind,
            synchronous = matches!(submission, Submission::Completed { .. }),
            "Provider accepted submission",
        );
        Ok(submission)
    }

    async fn poll_status(&self, task_handle: &str) -> Result<ProviderStatus, ProviderError> {
        let response = self
            .authorize(self.client.get(self.item_url(task_handle)))
            .send()
            .await?;

        let status = match self.dialect {
            Dialect::Task => Self::parse_response::<TaskBody>(response).await?.normalize(),
            Dialect::Prediction => Self::parse_response::<PredictionBody>(response)
                .await?
                .normalize(),
        };
        Ok(status)
    }

    async fn cancel(&self, task_handle: &str) -> Result<(), ProviderError> {
        let builder = match self.dialect {
            Dialect::Task => self.client.delete(self.item_url(task_handle)),
            Dialect::Prediction => self
                .client
                .post(format!("{}/cancel", self.item_url(task_handle))),
        };
        let response = self.authorize(builder).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}
