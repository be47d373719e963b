//! Embedding providers.
//!
//! The retrieval core treats the provider as an opaque `embed(text, model)`
//! function; concrete adapters live in [`providers`].

pub mod provider;
pub mod providers;

pub use provider::{create_provider, known_dimensions, EmbeddingProvider};
pub use providers::{MockProvider, OpenAiProvider};
