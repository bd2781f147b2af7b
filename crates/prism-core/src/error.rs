//! Error types for the prism routing layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using prism's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error category used by retry and fallback decisions.
///
/// Categories, not concrete error variants, drive behavior: the scheduler
/// retries retryable categories in place, the repair pipeline intercepts
/// `Parse`, and everything else propagates as a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed request from the caller. Never retried.
    InputValidation,
    /// Provider returned an unexpected shape. Not retried at the network
    /// layer; handled by the repair pipeline instead.
    TypeSafety,
    /// Connection-level failure. Retryable.
    Network,
    /// Request exceeded its deadline. Retryable.
    Timeout,
    /// Provider rate limit hit (HTTP 429). Retryable.
    RateLimit,
    /// Provider-side failure (HTTP 5xx or API error). Retryable.
    Provider,
    /// Response text could not be parsed. Triggers the repair pipeline.
    Parse,
    /// Anything else. Surfaced as-is, never retried.
    Unknown,
}

impl ErrorCategory {
    /// Whether the scheduler should retry this category with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::Provider
        )
    }

    /// Stable, user-presentable message for this category.
    ///
    /// Raw provider error text must never reach end users; it is logged
    /// with the correlation id instead. Callers surface this message plus
    /// the machine category.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InputValidation => "The request was malformed.",
            Self::TypeSafety | Self::Parse => "The model returned an unexpected response.",
            Self::Network | Self::Timeout => "The model service did not respond in time.",
            Self::RateLimit => "The model service is busy. Please retry shortly.",
            Self::Provider => "The model service reported an error.",
            Self::Unknown => "An unexpected error occurred.",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InputValidation => "input_validation",
            Self::TypeSafety => "type_safety",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Provider => "provider",
            Self::Parse => "parse",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Core error type for prism operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request from the caller
    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// Unexpected response shape from a provider
    #[error("Type safety error: {0}")]
    TypeSafety(String),

    /// Connection-level network failure
    #[error("Network error: {0}")]
    Network(String),

    /// Deadline exceeded
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Provider rate limit hit
    #[error("Rate limited: {0}")]
    RateLimit(String),

    /// Provider-side failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Response text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Integrity check failed (checksum/signature mismatch)
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The category driving retry and fallback behavior.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InputValidation(_) => ErrorCategory::InputValidation,
            Error::TypeSafety(_) => ErrorCategory::TypeSafety,
            Error::Network(_) => ErrorCategory::Network,
            Error::Timeout(_) => ErrorCategory::Timeout,
            Error::RateLimit(_) => ErrorCategory::RateLimit,
            Error::Provider(_) => ErrorCategory::Provider,
            Error::Parse(_) => ErrorCategory::Parse,
            Error::Config(_) | Error::Integrity(_) | Error::Internal(_) | Error::Io(_) => {
                ErrorCategory::Unknown
            }
        }
    }

    /// Whether the scheduler should retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Stable, user-presentable message for this error's category.
    pub fn user_message(&self) -> &'static str {
        self.category().user_message()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() {
            Error::Network(e.to_string())
        } else {
            Error::Provider(e.to_string())
        }
    }
}
