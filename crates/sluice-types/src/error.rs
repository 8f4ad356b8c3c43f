//! Structured error model for source and destination operations.
//!
//! [`ConnectorError`] carries a classification and retry metadata. Construct
//! via the category-specific factory methods; the category decides whether
//! the retry wrapper may try again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What went wrong, coarsely. Drives retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad or missing endpoint settings.
    Config,
    /// Credentials rejected.
    Auth,
    /// Credentials accepted but access denied.
    Permission,
    /// Throttled by the remote end.
    RateLimit,
    /// Gave up waiting.
    Timeout,
    /// Nothing listening, or the connection was refused.
    ConnectionRefused,
    /// Reset, broken pipe and similar blips.
    TransientNetwork,
    /// A record could not be parsed or was rejected.
    Data,
    /// Schema mismatch or unsupported DDL.
    Schema,
    /// Bug or invariant failure inside the connector.
    Internal,
}

impl ErrorCategory {
    /// Whether failures of this category are worth retrying.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Timeout | Self::ConnectionRefused | Self::TransientNetwork
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::TransientNetwork => "transient_network",
            Self::Data => "data",
            Self::Schema => "schema",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a source or destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{category}] {code}: {message}")]
pub struct ConnectorError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    /// Server-supplied delay hint, honored over computed backoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ConnectorError {
    fn new(category: ErrorCategory, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retryable: category.is_transient(),
            retry_after_ms: None,
        }
    }

    #[must_use]
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, code, message)
    }

    #[must_use]
    pub fn auth(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Auth, code, message)
    }

    #[must_use]
    pub fn permission(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Permission, code, message)
    }

    /// Rate limit error (retryable).
    #[must_use]
    pub fn rate_limit(
        code: impl Into<String>,
        message: impl Into<String>,
        retry_after_ms: Option<u64>,
    ) -> Self {
        let mut err = Self::new(ErrorCategory::RateLimit, code, message);
        err.retry_after_ms = retry_after_ms;
        err
    }

    /// Timeout (retryable).
    #[must_use]
    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, code, message)
    }

    /// Connection refused (retryable).
    #[must_use]
    pub fn connection_refused(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ConnectionRefused, code, message)
    }

    #[must_use]
    pub fn transient_network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::TransientNetwork, code, message)
    }

    /// Data validation error (not retryable).
    #[must_use]
    pub fn data(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Data, code, message)
    }

    /// Schema mismatch or unsupported DDL (not retryable).
    #[must_use]
    pub fn schema(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Schema, code, message)
    }

    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, code, message)
    }

    /// Map an I/O failure onto a category: missing files and permission
    /// problems are terminal, interrupted or timed-out operations are not.
    #[must_use]
    pub fn from_io(code: impl Into<String>, err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => Self::config(code, message),
            ErrorKind::PermissionDenied => Self::permission(code, message),
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::timeout(code, message),
            ErrorKind::ConnectionRefused => Self::connection_refused(code, message),
            ErrorKind::Interrupted | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                Self::transient_network(code, message)
            }
            ErrorKind::InvalidData => Self::data(code, message),
            _ => Self::internal(code, message),
        }
    }
}
