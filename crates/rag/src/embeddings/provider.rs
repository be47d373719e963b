//! Embedding provider trait and factory.

use std::sync::Arc;

use storechat_core::{AppError, AppResult, EmbeddingSettings, ProviderError};

use super::providers::{mock::MockProvider, openai::OpenAiProvider};

/// Dimensionality of the hosted embedding models we know about.
pub fn known_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// Trait for embedding providers.
///
/// Failures are reported as [`ProviderError`]s and are never retried here;
/// retry policy belongs to the calling runtime.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "openai")
    fn provider_name(&self) -> &str;

    /// Vector length produced for `model`, if known.
    fn dimensions(&self, model: &str) -> Option<usize>;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String], model: &str) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str, model: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()], model).await?;
        results.pop().ok_or_else(|| {
            AppError::Provider(ProviderError::permanent(
                self.provider_name(),
                "no embedding returned",
            ))
        })
    }
}

/// Create an embedding provider from settings.
pub fn create_provider(
    settings: &EmbeddingSettings,
    api_key: Option<String>,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "mock" => Ok(Arc::new(MockProvider::new(
            known_dimensions(&settings.model).unwrap_or(MockProvider::DEFAULT_DIMENSIONS),
        ))),

        "openai" => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config(format!(
                    "API key not found in environment variable: {}",
                    settings.api_key_env
                ))
            })?;
            Ok(Arc::new(OpenAiProvider::new(settings, api_key)?))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: openai, mock",
            settings.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_dimensions() {
        assert_eq!(known_dimensions("text-embedding-3-small"), Some(1536));
        assert_eq!(known_dimensions("text-embedding-3-large"), Some(3072));
        assert_eq!(known_dimensions("trigram-v1"), None);
    }

    #[test]
    fn test_create_mock_provider() {
        let settings = EmbeddingSettings {
            provider: "mock".to_string(),
            ..Default::default()
        };

        let provider = create_provider(&settings, None).unwrap();
        assert_eq!(provider.provider_name(), "mock");
        assert_eq!(provider.dimensions("text-embedding-3-small"), Some(1536));
    }

    #[test]
    fn test_create_openai_requires_key() {
        let settings = EmbeddingSettings::default();
        let result = create_provider(&settings, None);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_create_unknown_provider() {
        let settings = EmbeddingSettings {
            provider: "unknown".to_string(),
            ..Default::default()
        };

        let result = create_provider(&settings, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unknown embedding provider"));
    }

    #[tokio::test]
    async fn test_provider_embed_single() {
        let settings = EmbeddingSettings {
            provider: "mock".to_string(),
            ..Default::default()
        };
        let provider = create_provider(&settings, None).unwrap();

        let embedding = provider
            .embed("test text", "text-embedding-3-small")
            .await
            .unwrap();
        assert_eq!(embedding.len(), 1536);
    }
}
