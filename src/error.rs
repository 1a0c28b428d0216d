// SPDX-License-Identifier: MIT
//! Error taxonomy for the review daemon.
//!
//! Failures are classified by how they recover: authentication and validation
//! errors are rejected at the edge and never retried; provider transport
//! errors bubble up to the job scheduler's retry loop; AI, single-file, and
//! notification failures are absorbed locally and never fail a job.

use thiserror::Error;

/// Top-level error type for daemon operations.
#[derive(Debug, Error)]
pub enum ReviewdError {
    /// Bad or missing webhook signature / API token. Rejected, never retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Malformed event or job payload. Logged and dropped, never enqueued.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Source-control provider API failure. Transient variants are retried
    /// by the scheduler with backoff.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// AI reviewer failure. Always recovered locally — analysis degrades to
    /// pattern-only results.
    #[error("AI reviewer error: {0}")]
    Ai(#[from] AiError),

    /// Database read/write failure. Fatal to the current job.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Daemon configuration problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced entity (repository, review, installation) is unknown.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for ReviewdError {
    fn from(err: sqlx::Error) -> Self {
        ReviewdError::Persistence(err.to_string())
    }
}

/// Error from a source-control provider client.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Path does not exist at the requested revision.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit or network failure — worth retrying.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The provider rejected our credentials.
    #[error("provider authentication failed: {0}")]
    Auth(String),

    /// Any other API-level rejection.
    #[error("provider API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
}

impl ProviderError {
    /// Whether the scheduler should retry a job that failed with this error.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transient(_) => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Classify a reqwest transport failure (timeouts and connection drops
    /// are transient; everything else surfaces as-is).
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProviderError::Transient(err.to_string())
        } else {
            ProviderError::Api {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }
}

/// Error from the external AI reviewer.
#[derive(Debug, Error)]
pub enum AiError {
    /// No endpoint/API key configured — the stage is simply skipped.
    #[error("AI reviewer is not configured")]
    Disabled,

    /// Quota or rate-limit exhaustion (HTTP 429 or a quota message).
    #[error("AI quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Transport-level failure talking to the AI endpoint.
    #[error("AI request failed: {0}")]
    Request(String),

    /// The response could not be parsed into a structured review.
    #[error("AI response parse failed: {0}")]
    Parse(String),
}

impl AiError {
    pub fn is_quota(&self) -> bool {
        matches!(self, AiError::QuotaExceeded(_))
    }
}

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, ReviewdError>;
