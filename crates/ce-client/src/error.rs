//! Error types for ce-client

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the compilation service
#[derive(Error, Debug)]
pub enum CeError {
    /// The caller's cancellation token fired
    #[error("cancelled by user")]
    Cancelled,

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http {
        status: u16,
        url: String,
        body: String,
        /// Server-provided `Retry-After` hint, if any
        retry_after: Option<Duration>,
    },

    /// The request timed out
    #[error("timeout talking to {url}: {detail}")]
    Timeout { url: String, detail: String },

    /// Connection reset, refused, or otherwise broken
    #[error("connection error talking to {url}: {detail}")]
    Connection { url: String, detail: String },

    /// Response body could not be decoded
    #[error("could not decode response from {url}: {detail}")]
    Decode { url: String, detail: String },

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client could not be built from its configuration
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl CeError {
    /// Whether the retry loop should try the request again.
    ///
    /// Retryable: 408/429/500/502/503/504, timeouts and broken connections.
    pub fn is_retryable(&self) -> bool {
        match self {
            CeError::Http { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            CeError::Timeout { .. } | CeError::Connection { .. } => true,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CeError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CeError::Timeout { .. })
    }

    /// Map a reqwest failure into the taxonomy above.
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CeError::Timeout {
                url: url.to_string(),
                detail: err.to_string(),
            }
        } else if err.is_decode() || err.is_body() {
            CeError::Decode {
                url: url.to_string(),
                detail: err.to_string(),
            }
        } else if err.is_builder() {
            CeError::Config(err.to_string())
        } else {
            CeError::Connection {
                url: url.to_string(),
                detail: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> CeError {
        CeError::Http {
            status,
            url: "https://example.test/api".to_string(),
            body: String::new(),
            retry_after: None,
        }
    }

    #[test]
    fn test_retryable_status_codes() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(http(status).is_retryable(), "{status} should retry");
        }
        for status in [400, 401, 403, 404, 422, 501] {
            assert!(!http(status).is_retryable(), "{status} should not retry");
        }
    }

    #[test]
    fn test_transport_faults_retry_but_cancel_does_not() {
        let timeout = CeError::Timeout {
            url: "u".into(),
            detail: "slow".into(),
        };
        assert!(timeout.is_retryable());
        assert!(timeout.is_timeout());

        let reset = CeError::Connection {
            url: "u".into(),
            detail: "reset".into(),
        };
        assert!(reset.is_retryable());
        assert!(!reset.is_timeout());

        assert!(!CeError::Cancelled.is_retryable());
        assert!(CeError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(http(503).to_string(), "HTTP 503 from https://example.test/api");
        assert_eq!(CeError::Cancelled.to_string(), "cancelled by user");
    }
}
