use thiserror::Error;

/// Errors that can occur during image analysis operations
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// No response reached the provider (DNS, TLS, timeout, connection reset)
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider rejected the credential (HTTP 401/403)
    #[error("invalid API key: {0}")]
    Auth(String),

    /// Provider is throttling us (HTTP 429)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Provider rejected the request itself (HTTP 400)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Any other non-success HTTP status
    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// All retry attempts were consumed without a success
    #[error("maximum retries exceeded")]
    RetriesExhausted,

    /// Provider id not known to the factory
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider exists but is disabled in configuration
    #[error("provider '{0}' is not enabled in configuration")]
    ProviderDisabled(String),

    /// No API key found in config, secret store or environment
    #[error("no API key configured for provider '{0}'")]
    MissingKey(String),

    /// Operation not valid in the current state (e.g. switching providers mid-batch)
    #[error("invalid operation: {0}")]
    InvalidState(String),

    /// Secret store (OS keychain) failure
    #[error("secret store error: {0}")]
    Secret(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error reading image files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Transport failures, 429s and a small allow-list of transient 5xx
    /// statuses qualify; auth and client errors are surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Transport(_) | AnalysisError::RateLimited(_) => true,
            AnalysisError::Api { status, .. } => {
                matches!(status, 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        assert!(AnalysisError::RateLimited("slow down".to_string()).is_retryable());
    }

    #[test]
    fn test_auth_is_not_retryable() {
        assert!(!AnalysisError::Auth("nope".to_string()).is_retryable());
        assert!(!AnalysisError::BadRequest("bad image".to_string()).is_retryable());
        assert!(!AnalysisError::RetriesExhausted.is_retryable());
    }

    #[test]
    fn test_transient_server_errors_are_retryable() {
        for status in [500, 502, 503, 504] {
            let err = AnalysisError::Api {
                status,
                message: "boom".to_string(),
            };
            assert!(err.is_retryable(), "expected {} to be retryable", status);
        }
        let err = AnalysisError::Api {
            status: 501,
            message: "not implemented".to_string(),
        };
        assert!(!err.is_retryable());
    }
}
