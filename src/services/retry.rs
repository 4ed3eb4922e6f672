//! Retry budget and failure taxonomy for client API requests.

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Coarse failure class used to decide whether and how to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Authentication,
    NotFound,
    Timeout,
    Parse,
    Unknown,
}

/// Failure of a client API request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LcuError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication rejected (HTTP {status})")]
    Authentication { status: u16 },

    #[error("Endpoint not found: {endpoint}")]
    NotFound { endpoint: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server reported a request timeout (HTTP 408) for {endpoint}")]
    ServerTimeout { endpoint: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Unexpected response (HTTP {status}): {message}")]
    Unknown { status: u16, message: String },
}

impl LcuError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LcuError::Connection(_) => ErrorKind::Connection,
            LcuError::Authentication { .. } => ErrorKind::Authentication,
            LcuError::NotFound { .. } => ErrorKind::NotFound,
            LcuError::Timeout(_) | LcuError::ServerTimeout { .. } => ErrorKind::Timeout,
            LcuError::Parse(_) => ErrorKind::Parse,
            LcuError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Whether this failure counts against the request's failure counters.
    ///
    /// A missing endpoint means the feature is absent, not that the request
    /// failed.
    pub fn is_failure(&self) -> bool {
        self.kind() != ErrorKind::NotFound
    }
}

/// Map a non-success HTTP status to the taxonomy. Returns `None` for 200/204.
pub fn classify_status(status: u16, endpoint: &str, body: &str) -> Option<LcuError> {
    match status {
        200 | 204 => None,
        401 | 403 => Some(LcuError::Authentication { status }),
        404 => Some(LcuError::NotFound {
            endpoint: endpoint.to_string(),
        }),
        408 => Some(LcuError::ServerTimeout {
            endpoint: endpoint.to_string(),
        }),
        s if s >= 500 => Some(LcuError::Connection(format!("server error HTTP {}", s))),
        s => Some(LcuError::Unknown {
            status: s,
            message: body.chars().take(200).collect(),
        }),
    }
}

/// How many attempts a request gets and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Rediscover the endpoint after a connection failure before retrying.
    pub auto_reconnect: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            auto_reconnect: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration, auto_reconnect: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            auto_reconnect,
        }
    }

    /// Whether another attempt may follow a failure of this kind.
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        matches!(kind, ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Unknown)
    }

    /// Whether the failure should trigger endpoint rediscovery first.
    pub fn triggers_reconnect(&self, kind: ErrorKind) -> bool {
        self.auto_reconnect && kind == ErrorKind::Connection
    }

    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}
