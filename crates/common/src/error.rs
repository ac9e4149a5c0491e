use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited by exchange")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient exchange failure: {0}")]
    Transient(String),

    #[error("Exchange rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed exchange response: {0}")]
    Decode(String),

    #[error("Shard deadline exceeded")]
    Timeout,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Default retry predicate: only rate limits and transient failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited { .. } | Error::Transient(_))
    }

    /// Server-provided wait hint, if the exchange sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Transient(_) | Error::Io(_) => ErrorKind::Transient,
            Error::Rejected { .. } => ErrorKind::Rejected,
            Error::Decode(_) | Error::Json(_) => ErrorKind::Decode,
            Error::Timeout => ErrorKind::Timeout,
            Error::Config(_) => ErrorKind::Internal,
        }
    }
}

/// Failure category carried as data inside a `ShardResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    Authentication,
    RateLimited,
    Transient,
    Rejected,
    Decode,
    Timeout,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Authentication => "authentication",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Transient => "transient",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Decode => "decode",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// Serializable failure detail attached to one shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ShardError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, Error::Timeout.to_string())
    }
}

impl From<&Error> for ShardError {
    fn from(err: &Error) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<Error> for ShardError {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

impl std::fmt::Display for ShardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
