use std::fmt;
use thiserror::Error;

/// Why the feed could not be acquired from upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Non-success HTTP status other than rate limiting
    Status(u16),
    /// HTTP 429 from Overcast
    RateLimited,
    /// The request never produced a response (DNS, TLS, timeout, ...)
    Transport(String),
}

impl FetchFailure {
    pub fn from_status(status: u16) -> Self {
        if status == 429 {
            FetchFailure::RateLimited
        } else {
            FetchFailure::Status(status)
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Status(code) => write!(f, "HTTP status {}", code),
            FetchFailure::RateLimited => write!(f, "rate limited (HTTP 429)"),
            FetchFailure::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PalError {
    /// Upstream unreachable or rejecting, and no cached copy to fall back on
    #[error("Fetch Error: {0}")]
    FetchError(FetchFailure),

    /// Store misconfiguration, query/write failure, or cache write failure
    #[error("Storage Error: {0}")]
    StorageError(String),

    /// Credential exchange failed or credentials missing
    #[error("Authentication Error: {0}")]
    AuthenticationError(String),

    /// Missing or malformed settings
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Feed or record could not be parsed
    #[error("Parse Error: {0}")]
    ParseError(String),
}

impl From<std::io::Error> for PalError {
    fn from(err: std::io::Error) -> Self {
        PalError::StorageError(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for PalError {
    fn from(err: serde_json::Error) -> Self {
        PalError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<redis::RedisError> for PalError {
    fn from(err: redis::RedisError) -> Self {
        PalError::StorageError(format!("Redis error: {}", err))
    }
}

impl From<quick_xml::Error> for PalError {
    fn from(err: quick_xml::Error) -> Self {
        PalError::ParseError(format!("Failed to parse OPML: {}", err))
    }
}

impl From<reqwest::Error> for PalError {
    fn from(err: reqwest::Error) -> Self {
        PalError::FetchError(FetchFailure::Transport(err.to_string()))
    }
}

impl PalError {
    /// Whether a later run (not this one) could succeed without intervention.
    /// Nothing in the crate retries; this is for the caller's scheduling.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PalError::FetchError(FetchFailure::RateLimited) => true,
            PalError::FetchError(FetchFailure::Transport(_)) => true,
            PalError::FetchError(FetchFailure::Status(code)) => *code >= 500,
            PalError::StorageError(_) => true, // store might come back
            PalError::AuthenticationError(_) => false,
            PalError::ConfigError(_) => false,
            PalError::ParseError(_) => false,
        }
    }

    pub fn categorize(&self) -> ErrorCategory {
        match self {
            PalError::FetchError(_) => ErrorCategory::Network,
            PalError::StorageError(_) => ErrorCategory::Storage,
            PalError::AuthenticationError(_) | PalError::ConfigError(_) => {
                ErrorCategory::Configuration
            }
            PalError::ParseError(_) => ErrorCategory::Data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Storage,
    Configuration,
    Data,
}
