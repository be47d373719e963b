//! Storechat Core Library
//!
//! This crate provides the foundational utilities shared by the storechat crates:
//! - Error handling (`AppError`, `AppResult`, `ValidationError`, `ProviderError`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, EmbeddingSettings, RetrievalSettings, VectorStoreSettings};
pub use error::{AppError, AppResult, ProviderError, ProviderErrorKind, ValidationError};
