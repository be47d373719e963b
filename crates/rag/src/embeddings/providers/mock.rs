//! Mock embedding provider using trigram-hashed, content-aware embeddings.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use storechat_core::{AppError, AppResult, ProviderError};

use crate::embeddings::provider::EmbeddingProvider;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them",
];

/// Deterministic provider for tests and offline runs.
///
/// Texts are embedded from character trigrams and word hashes. Tests can pin
/// exact vectors for specific texts, script a failure, and count calls.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
    fixed: HashMap<String, Vec<f32>>,
    failure: Mutex<Option<ProviderError>>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub const DEFAULT_DIMENSIONS: usize = 384;

    /// Create a new mock provider with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fixed: HashMap::new(),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Return `vector` whenever exactly `text` is embedded.
    pub fn with_fixed(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.into(), vector);
        self
    }

    /// Fail every call with `error` until [`MockProvider::clear_failure`].
    pub fn fail_with(self, error: ProviderError) -> Self {
        self.set_failure(Some(error));
        self
    }

    pub fn clear_failure(&self) {
        self.set_failure(None);
    }

    fn set_failure(&self, error: Option<ProviderError>) {
        if let Ok(mut guard) = self.failure.lock() {
            *guard = error;
        }
    }

    /// Number of `embed_batch` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Generate a mock embedding for text using trigram-based approach.
    fn generate_mock_embedding(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self.fixed.get(text) {
            return vector.clone();
        }

        let mut embedding = vec![0.0; self.dimensions];
        let lower = text.to_lowercase();
        let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();

        let mut word_freq: HashMap<&str, usize> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2 && !stop_words.contains(w))
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        // Iterate in sorted order so float accumulation is reproducible
        let mut words: Vec<_> = word_freq.into_iter().collect();
        words.sort_unstable();

        for (word, freq) in words {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram_hash = window
                    .iter()
                    .collect::<String>()
                    .bytes()
                    .fold(0u64, |acc, b| acc.wrapping_mul(37).wrapping_add(b as u64));

                let dim_idx = (trigram_hash as usize) % self.dimensions;
                embedding[dim_idx] += (freq as f32).sqrt();
            }

            let word_hash = word
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            let base_dim = (word_hash as usize) % self.dimensions;
            embedding[base_dim] += freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn dimensions(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }

    async fn embed_batch(&self, texts: &[String], _model: &str) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failure = self.failure.lock().ok().and_then(|guard| guard.clone());
        if let Some(error) = failure {
            return Err(AppError::Provider(error));
        }

        Ok(texts
            .iter()
            .map(|text| self.generate_mock_embedding(text))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storechat_core::ProviderErrorKind;

    const MODEL: &str = "trigram-v1";

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_mock_provider_embed_single() {
        let provider = MockProvider::new(384);
        let embedding = provider.embed("wireless headphones", MODEL).await.unwrap();

        assert_eq!(embedding.len(), 384);
        assert!((norm(&embedding) - 1.0).abs() < 0.001);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_deterministic() {
        let provider = MockProvider::new(384);

        let embedding1 = provider.embed("return policy", MODEL).await.unwrap();
        let embedding2 = provider.embed("return policy", MODEL).await.unwrap();
        assert_eq!(embedding1, embedding2);

        let other = provider.embed("shipping rates", MODEL).await.unwrap();
        assert_ne!(embedding1, other);
    }

    #[tokio::test]
    async fn test_mock_provider_empty_text() {
        let provider = MockProvider::new(16);
        let embedding = provider.embed("", MODEL).await.unwrap();

        assert_eq!(embedding.len(), 16);
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_mock_provider_fixed_vector() {
        let provider = MockProvider::new(3).with_fixed("query", vec![1.0, 0.0, 0.0]);

        let embedding = provider.embed("query", MODEL).await.unwrap();
        assert_eq!(embedding, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_mock_provider_scripted_failure() {
        let provider = MockProvider::new(8).fail_with(ProviderError::new(
            "mock",
            ProviderErrorKind::RateLimited,
            "quota exceeded",
        ));

        let err = provider.embed("anything", MODEL).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(provider.calls(), 1);

        provider.clear_failure();
        assert!(provider.embed("anything", MODEL).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_provider_utf8_safety() {
        let provider = MockProvider::new(384);
        let embedding = provider
            .embed("Fones de ouvido sem fio 🎧 com cancelamento de ruído", MODEL)
            .await
            .unwrap();

        assert!((norm(&embedding) - 1.0).abs() < 0.001);
    }
}
