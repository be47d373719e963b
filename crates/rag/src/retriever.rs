//! Query → ranked chunks for one tenant/site.
//!
//! The retriever embeds the query, asks the search strategy for the nearest
//! chunks inside the validated scope, and turns distances into similarities.
//! Provider and store errors pass through untouched; nothing is retried.

use std::sync::Arc;

use storechat_core::{AppResult, ProviderError, ValidationError};
use tracing::{debug, instrument, warn};

use crate::embeddings::EmbeddingProvider;
use crate::guardrail::RetrievalScope;
use crate::policy::RetrievalPolicy;
use crate::search::SearchStrategy;
use crate::store::{ChunkFilter, MatchRequest};
use crate::types::RetrievedChunk;

/// Embeds queries and searches the vector store.
#[derive(Debug, Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    strategy: Arc<dyn SearchStrategy>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, strategy: Arc<dyn SearchStrategy>) -> Self {
        Self { embedder, strategy }
    }

    /// Name of the search strategy in use.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Retrieve chunks for `query`, most similar first.
    ///
    /// An empty scope (every requested type sanitized away) yields no chunks
    /// without touching the embedder or the store. Returned chunks carry no
    /// embedding vectors.
    #[instrument(skip_all, fields(strategy = self.strategy.name(), top_k = policy.top_k))]
    pub async fn retrieve(
        &self,
        scope: &RetrievalScope,
        query: &str,
        policy: &RetrievalPolicy,
    ) -> AppResult<Vec<RetrievedChunk>> {
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        if scope.is_empty() {
            debug!("Scope has no source types left; skipping retrieval");
            return Ok(Vec::new());
        }

        let model = policy.embedding_model.as_str();
        let query_vector = self.embedder.embed(query, model).await?;

        if let Some(expected) = self.embedder.dimensions(model) {
            if query_vector.len() != expected {
                return Err(ProviderError::permanent(
                    self.embedder.provider_name(),
                    format!(
                        "model {} returned {} dimensions, expected {}",
                        model,
                        query_vector.len(),
                        expected
                    ),
                )
                .into());
            }
        }

        let metric = self.strategy.distance_metric();
        let request = MatchRequest {
            query_vector,
            max_distance: metric.max_distance(policy.similarity_threshold),
            top_k: policy.top_k,
            filter: ChunkFilter::from(scope),
        };

        let matches = self.strategy.search(&request).await?;
        let returned = matches.len();

        let mut results = Vec::with_capacity(returned);
        for found in matches {
            let mut chunk = found.chunk;

            if !chunk.is_owned_by(&scope.tenant_id, &scope.site_id)
                || !scope.contains(chunk.source_type)
            {
                warn!(
                    chunk_id = %chunk.id,
                    chunk_tenant = %chunk.tenant_id,
                    chunk_site = %chunk.site_id,
                    "Store returned a row outside the requested scope; dropping it"
                );
                continue;
            }

            let similarity = metric.similarity(found.distance)?;
            if similarity < policy.similarity_threshold {
                continue;
            }

            // Vectors are only needed for scoring
            chunk.embedding = Vec::new();
            results.push(RetrievedChunk { chunk, similarity });
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(policy.top_k);

        debug!(returned, kept = results.len(), "Retrieval complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockProvider;
    use crate::search::{IndexedSearch, LinearScan};
    use crate::store::{InMemoryVectorStore, MatchRequest, StoreMatch, VectorStore};
    use crate::types::{Chunk, SourceType};
    use async_trait::async_trait;
    use storechat_core::{AppError, ProviderErrorKind};

    const QUERY: &str = "trail running shoes";

    fn unit(similarity: f32) -> Vec<f32> {
        let c = 2.0 * similarity - 1.0;
        vec![c, (1.0 - c * c).max(0.0).sqrt(), 0.0]
    }

    fn chunk(id: &str, tenant: &str, source_type: SourceType, similarity: f32) -> Chunk {
        Chunk {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            site_id: "s1".to_string(),
            source_type,
            source_id: id.to_string(),
            version: 1,
            chunk_index: 0,
            text: id.to_string(),
            content_hash: id.to_string(),
            embedding: unit(similarity),
            title: None,
            url: None,
            source_updated_at: None,
        }
    }

    fn scope(tenant: &str) -> RetrievalScope {
        RetrievalScope {
            tenant_id: tenant.to_string(),
            site_id: "s1".to_string(),
            source_types: SourceType::ALL.to_vec(),
        }
    }

    fn embedder() -> Arc<MockProvider> {
        Arc::new(MockProvider::new(3).with_fixed(QUERY, vec![1.0, 0.0, 0.0]))
    }

    fn policy() -> RetrievalPolicy {
        RetrievalPolicy::new().with_similarity_threshold(0.7)
    }

    fn retriever(embedder: Arc<MockProvider>, store: InMemoryVectorStore) -> Retriever {
        Retriever::new(embedder, Arc::new(IndexedSearch::new(Arc::new(store))))
    }

    #[tokio::test]
    async fn test_threshold_and_ordering() {
        let store = InMemoryVectorStore::new();
        store
            .insert(vec![
                chunk("mid", "t1", SourceType::Page, 0.75),
                chunk("best", "t1", SourceType::Product, 0.95),
                chunk("low", "t1", SourceType::Policy, 0.3),
            ])
            .unwrap();

        let results = retriever(embedder(), store)
            .retrieve(&scope("t1"), QUERY, &policy())
            .await
            .unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["best", "mid"]);
        assert!((results[0].similarity - 0.95).abs() < 1e-4);
        assert!(results.iter().all(|r| r.chunk.embedding.is_empty()));
    }

    #[tokio::test]
    async fn test_empty_query_rejected_before_embedding() {
        let embedder = embedder();
        let result = retriever(embedder.clone(), InMemoryVectorStore::new())
            .retrieve(&scope("t1"), "   ", &policy())
            .await;

        assert!(matches!(
            result,
            Err(AppError::Validation(ValidationError::EmptyQuery))
        ));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_scope_skips_io() {
        let embedder = embedder();
        let store = Arc::new(InMemoryVectorStore::new());
        let retriever = Retriever::new(embedder.clone(), Arc::new(IndexedSearch::new(store.clone())));

        let mut empty = scope("t1");
        empty.source_types.clear();
        let results = retriever.retrieve(&empty, QUERY, &policy()).await.unwrap();

        assert!(results.is_empty());
        assert_eq!(embedder.calls(), 0);
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_propagates_unchanged() {
        let embedder = Arc::new(
            MockProvider::new(3).fail_with(ProviderError::new(
                "mock",
                ProviderErrorKind::RateLimited,
                "slow down",
            )),
        );
        let result = retriever(embedder, InMemoryVectorStore::new())
            .retrieve(&scope("t1"), QUERY, &policy())
            .await;

        match result {
            Err(AppError::Provider(e)) => {
                assert_eq!(e.kind, ProviderErrorKind::RateLimited);
                assert!(e.is_transient());
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_linear_scan_gives_same_results() {
        let corpus = vec![
            chunk("a", "t1", SourceType::Product, 0.9),
            chunk("b", "t1", SourceType::Page, 0.8),
            chunk("c", "t1", SourceType::Policy, 0.5),
        ];
        let indexed_store = InMemoryVectorStore::new();
        indexed_store.insert(corpus.clone()).unwrap();
        let scan_store = InMemoryVectorStore::without_index();
        scan_store.insert(corpus).unwrap();

        let indexed = retriever(embedder(), indexed_store)
            .retrieve(&scope("t1"), QUERY, &policy())
            .await
            .unwrap();
        let scanned = Retriever::new(embedder(), Arc::new(LinearScan::new(Arc::new(scan_store))))
            .retrieve(&scope("t1"), QUERY, &policy())
            .await
            .unwrap();

        assert_eq!(indexed, scanned);
        assert_eq!(indexed.len(), 2);
    }

    /// Store that ignores the filter, as a misconfigured RPC might.
    #[derive(Debug)]
    struct LeakyStore(Vec<Chunk>);

    #[async_trait]
    impl VectorStore for LeakyStore {
        fn name(&self) -> &str {
            "leaky"
        }

        async fn supports_indexed_search(&self) -> AppResult<bool> {
            Ok(true)
        }

        async fn match_chunks(&self, _request: &MatchRequest) -> AppResult<Vec<StoreMatch>> {
            Ok(self
                .0
                .iter()
                .cloned()
                .map(|chunk| StoreMatch { chunk, distance: 0.0 })
                .collect())
        }

        async fn scan_chunks(&self, _filter: &ChunkFilter) -> AppResult<Vec<Chunk>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_out_of_scope_rows_are_dropped() {
        let store = LeakyStore(vec![
            chunk("mine", "t1", SourceType::Product, 1.0),
            chunk("theirs", "t2", SourceType::Product, 1.0),
        ]);
        let retriever = Retriever::new(embedder(), Arc::new(IndexedSearch::new(Arc::new(store))));

        let results = retriever.retrieve(&scope("t1"), QUERY, &policy()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.tenant_id, "t1");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_permanent_error() {
        let embedder = Arc::new(MockProvider::new(3).with_fixed(QUERY, vec![1.0, 0.0]));
        let result = retriever(embedder, InMemoryVectorStore::new())
            .retrieve(&scope("t1"), QUERY, &policy())
            .await;

        assert!(matches!(result, Err(AppError::Provider(ref e)) if !e.is_transient()));
    }
}
