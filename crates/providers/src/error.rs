//! Provider error type and transient/terminal classification.

/// Longest response body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Errors from a provider HTTP call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The provider refused the job outright at submission.
    #[error("Provider rejected the job: {0}")]
    Rejected(String),

    /// The response did not have the shape the dialect expects.
    #[error("Unexpected provider response: {0}")]
    Decode(String),

    /// No provider is configured for the requested kind or name.
    #[error("No provider configured for {0}")]
    NotConfigured(String),
}

impl ProviderError {
    pub(crate) fn api(status: u16, body: String) -> Self {
        let body = if body.chars().count() > MAX_ERROR_BODY_CHARS {
            let mut truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            truncated.push('…');
            truncated
        } else {
            body
        };
        Self::Api { status, body }
    }

    /// Whether the failure is likely to clear up on retry.
    ///
    /// Network failures, timeouts, 404 (task not visible yet), 429 and 5xx
    /// are transient. Malformed bodies, other 4xx and explicit rejections
    /// are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !(e.is_decode() || e.is_builder() || e.is_redirect()),
            Self::Api { status, .. } => is_transient_status(*status),
            Self::Rejected(_) | Self::Decode(_) | Self::NotConfigured(_) => false,
        }
    }
}

/// HTTP statuses that are retried rather than treated as a job failure.
pub fn is_transient_status(status: u16) -> bool {
    status == 404 || status == 429 || (500..=599).contains(&status)
}
