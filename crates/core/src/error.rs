use thiserror::Error;

/// Shared classification for errors surfaced from the scan/analyze/execute loop.
///
/// Per-component errors (analyzer, scanner, merge executor, placement, reconciler) define their
/// own `thiserror` enums; this trait lets `LiveEngine` treat them uniformly without matching on
/// concrete variants.
pub trait ErrorClass {
    /// True if the operation can simply be retried next cycle (network blip, rate limit, a
    /// receipt that hasn't landed yet).
    fn is_retryable(&self) -> bool;

    /// True if this represents a safety-relevant condition (circuit breaker trip, balance
    /// mismatch) that should halt trading rather than just skip a cycle.
    fn is_safety_critical(&self) -> bool {
        false
    }
}

/// Errors common to components that talk to the off-chain CLOB or metadata service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    #[error("unexpected response shape from {endpoint}: {detail}")]
    UnexpectedResponse { endpoint: String, detail: String },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("service responded with status {status} for {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
}

impl ErrorClass for ServiceError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Transport(_)
                | ServiceError::RateLimited { .. }
                | ServiceError::Timeout { .. }
        )
    }
}

/// Errors from the configuration layer.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("configuration field {field} failed validation: {detail}")]
    Invalid { field: String, detail: String },
}

impl ErrorClass for ConfigError {
    fn is_retryable(&self) -> bool {
        false
    }
}
