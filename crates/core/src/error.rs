//! Error types for storechat.
//!
//! This module defines a unified error enum plus the two typed families the
//! retrieval core surfaces to its callers: guardrail violations
//! (`ValidationError`) and collaborator failures (`ProviderError`).

use std::fmt;

use thiserror::Error;

/// Unified error type for storechat.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Guardrail or input validation failure, raised before any I/O
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Embedding provider or vector store failure, passed through unmodified
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration errors (missing templates, unreadable config files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the caller may reasonably retry the failed operation.
    ///
    /// Only transient provider failures qualify; validation and configuration
    /// errors are caller bugs and never succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Provider(e) if e.is_transient())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Guardrail violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("tenant id is required")]
    MissingTenant,

    #[error("site id is required")]
    MissingSite,

    #[error("source type '{0}' is not allowed by the retrieval policy")]
    DisallowedSourceType(String),

    #[error("unknown source type '{0}'")]
    UnknownSourceType(String),

    #[error("query text is empty")]
    EmptyQuery,

    #[error("invalid retrieval policy: {0}")]
    InvalidPolicy(String),
}

/// Category of a collaborator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimited,
    Timeout,
    Network,
    Permanent,
}

impl ProviderErrorKind {
    /// Classify an HTTP status code returned by a collaborator.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            408 | 504 => Self::Timeout,
            500..=599 => Self::Network,
            _ => Self::Permanent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate limited",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Permanent => "permanent",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by the embedding provider or the vector store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{provider} ({kind}): {message}")]
pub struct ProviderError {
    /// Collaborator name (e.g. "openai", "postgrest")
    pub provider: String,

    pub kind: ProviderErrorKind,

    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Permanent, message)
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(provider: impl Into<String>, status: u16, body: &str) -> Self {
        Self::new(
            provider,
            ProviderErrorKind::from_status(status),
            format!("HTTP {}: {}", status, body.trim()),
        )
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self.kind, ProviderErrorKind::Permanent)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
