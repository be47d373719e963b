//! Search strategies over a [`VectorStore`].
//!
//! The store either exposes an indexed, server-side search function or it
//! does not. Which path is used is decided once by a capability probe; after
//! that the retriever only sees a [`SearchStrategy`], so both paths return
//! the same rows for the same request.

use std::sync::Arc;

use async_trait::async_trait;
use storechat_core::AppResult;
use tracing::{debug, info};

use crate::similarity::DistanceMetric;
use crate::store::{MatchRequest, StoreMatch, VectorStore};

/// Filtered nearest-neighbour search, nearest first.
#[async_trait]
pub trait SearchStrategy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Metric the returned distances are measured in.
    fn distance_metric(&self) -> DistanceMetric;

    async fn search(&self, request: &MatchRequest) -> AppResult<Vec<StoreMatch>>;
}

/// Delegates to the store's server-side search function.
#[derive(Debug, Clone)]
pub struct IndexedSearch {
    store: Arc<dyn VectorStore>,
}

impl IndexedSearch {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchStrategy for IndexedSearch {
    fn name(&self) -> &'static str {
        "indexed"
    }

    fn distance_metric(&self) -> DistanceMetric {
        self.store.distance_metric()
    }

    async fn search(&self, request: &MatchRequest) -> AppResult<Vec<StoreMatch>> {
        self.store.match_chunks(request).await
    }
}

/// Fetches the scoped chunks and scores them locally.
///
/// Slower than [`IndexedSearch`] but applies the same filter, cutoff and
/// top-K, so results only differ in cost.
#[derive(Debug, Clone)]
pub struct LinearScan {
    store: Arc<dyn VectorStore>,
}

impl LinearScan {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchStrategy for LinearScan {
    fn name(&self) -> &'static str {
        "linear-scan"
    }

    fn distance_metric(&self) -> DistanceMetric {
        self.store.distance_metric()
    }

    async fn search(&self, request: &MatchRequest) -> AppResult<Vec<StoreMatch>> {
        let metric = self.distance_metric();
        let candidates = self.store.scan_chunks(&request.filter).await?;
        let scanned = candidates.len();

        let mut matches: Vec<StoreMatch> = candidates
            .into_iter()
            .filter(|chunk| request.filter.matches(chunk))
            .filter_map(|chunk| {
                // Vectors from another model generation have a different width
                let distance = metric.distance(&request.query_vector, &chunk.embedding)?;
                (distance <= request.max_distance).then_some(StoreMatch { chunk, distance })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(request.top_k);

        debug!(scanned, matched = matches.len(), "Linear scan complete");
        Ok(matches)
    }
}

/// Probe the store once and pick the strategy to use for its lifetime.
pub async fn select_strategy(store: Arc<dyn VectorStore>) -> AppResult<Arc<dyn SearchStrategy>> {
    let strategy: Arc<dyn SearchStrategy> = if store.supports_indexed_search().await? {
        Arc::new(IndexedSearch::new(store.clone()))
    } else {
        Arc::new(LinearScan::new(store.clone()))
    };

    info!(store = store.name(), strategy = strategy.name(), "Selected search strategy");
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkFilter, InMemoryVectorStore};
    use crate::types::{Chunk, SourceType};

    fn chunk(id: &str, tenant: &str, source_type: SourceType, embedding: Vec<f32>) -> Chunk {
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
            embedding,
            title: None,
            url: None,
            source_updated_at: None,
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("a", "t1", SourceType::Product, vec![1.0, 0.0]),
            chunk("b", "t1", SourceType::Page, vec![0.8, 0.6]),
            chunk("c", "t1", SourceType::Policy, vec![0.0, 1.0]),
            chunk("d", "t2", SourceType::Product, vec![1.0, 0.0]),
            chunk("e", "t1", SourceType::Product, vec![1.0, 0.0, 0.0]),
        ]
    }

    fn request() -> MatchRequest {
        MatchRequest {
            query_vector: vec![1.0, 0.0],
            max_distance: 0.5,
            top_k: 10,
            filter: ChunkFilter {
                tenant_id: "t1".to_string(),
                site_id: "s1".to_string(),
                source_types: vec![SourceType::Product, SourceType::Page],
            },
        }
    }

    fn ids(matches: &[StoreMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.chunk.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_probe_selects_indexed_search() {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let strategy = select_strategy(store).await.unwrap();
        assert_eq!(strategy.name(), "indexed");
    }

    #[tokio::test]
    async fn test_probe_falls_back_to_linear_scan() {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::without_index());
        let strategy = select_strategy(store).await.unwrap();
        assert_eq!(strategy.name(), "linear-scan");
    }

    #[tokio::test]
    async fn test_linear_scan_matches_indexed_search() {
        let indexed_store = InMemoryVectorStore::new();
        indexed_store.insert(corpus()).unwrap();
        let scan_store = InMemoryVectorStore::without_index();
        scan_store.insert(corpus()).unwrap();

        let indexed = IndexedSearch::new(Arc::new(indexed_store))
            .search(&request())
            .await
            .unwrap();
        let scanned = LinearScan::new(Arc::new(scan_store))
            .search(&request())
            .await
            .unwrap();

        assert_eq!(ids(&indexed), vec!["a", "b"]);
        assert_eq!(ids(&scanned), ids(&indexed));
        for (x, y) in indexed.iter().zip(scanned.iter()) {
            assert!((x.distance - y.distance).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_linear_scan_respects_top_k() {
        let store = InMemoryVectorStore::without_index();
        store.insert(corpus()).unwrap();

        let mut request = request();
        request.top_k = 1;
        let matches = LinearScan::new(Arc::new(store)).search(&request).await.unwrap();
        assert_eq!(ids(&matches), vec!["a"]);
    }
}
