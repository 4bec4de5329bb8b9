use thiserror::Error;

/// Errors a source handler can raise for a whole fetch.
///
/// Missing or malformed fields for a single indicator are not errors: the
/// handler omits that indicator from its update instead.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("missing configuration {0}")]
    MissingConfig(String),

    #[error("invalid configuration {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("{provider} API error {status}")]
    HttpStatus { provider: String, status: u16 },

    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("{provider} requests suspended after repeated failures (circuit breaker open)")]
    CircuitBreakerOpen { provider: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("http client: {0}")]
    Client(String),
}

impl SourceError {
    /// Transient failures are retried by the HTTP fetcher.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::NetworkUnreachable(_) | SourceError::RateLimited { .. } => true,
            SourceError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
