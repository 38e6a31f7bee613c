use async_trait::async_trait;

use crate::error::ProviderError;
use crate::request::{GenerationRequest, Submission};
use crate::status::ProviderStatus;

/// Request/response contract of a generation provider.
///
/// Implementations are stateless apart from connection pooling and can be
/// shared across tasks behind an `Arc`.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Configured provider name, used in logs and job state.
    fn name(&self) -> &str;

    /// Submit a job.
    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError>;

    /// Fetch the normalised status of a previously accepted job.
    async fn poll_status(&self, task_handle: &str) -> Result<ProviderStatus, ProviderError>;

    /// Ask the provider to stop working on a job. Best effort; callers
    /// ignore the result beyond logging it.
    async fn cancel(&self, task_handle: &str) -> Result<(), ProviderError>;
}
