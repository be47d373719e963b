//! Vector store abstraction.
//!
//! Retrieval only ever reads through [`VectorStore`]; the indexer writes
//! through [`ChunkSink`]. Every read carries a [`ChunkFilter`] that the store
//! must apply server-side: the tenant/site filter is the isolation boundary.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`supports_indexed_search`](VectorStore::supports_indexed_search) | Capability probe for the server-side search function |
//! | [`match_chunks`](VectorStore::match_chunks) | Filtered nearest-neighbour search with distance cutoff |
//! | [`scan_chunks`](VectorStore::scan_chunks) | Filtered fetch of active chunks with vectors |

pub mod memory;
pub mod rest;

pub use memory::InMemoryVectorStore;
pub use rest::RestVectorStore;

use async_trait::async_trait;
use storechat_core::AppResult;

use crate::guardrail::RetrievalScope;
use crate::similarity::DistanceMetric;
use crate::types::{Chunk, SourceKey, SourceType};

/// Mandatory scoping for every store read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFilter {
    pub tenant_id: String,
    pub site_id: String,
    pub source_types: Vec<SourceType>,
}

impl ChunkFilter {
    pub fn matches(&self, chunk: &Chunk) -> bool {
        chunk.is_owned_by(&self.tenant_id, &self.site_id)
            && self.source_types.contains(&chunk.source_type)
    }
}

impl From<&RetrievalScope> for ChunkFilter {
    fn from(scope: &RetrievalScope) -> Self {
        Self {
            tenant_id: scope.tenant_id.clone(),
            site_id: scope.site_id.clone(),
            source_types: scope.source_types.clone(),
        }
    }
}

/// One similarity search against the store.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub query_vector: Vec<f32>,
    /// Rows farther than this are not returned
    pub max_distance: f32,
    pub top_k: usize,
    pub filter: ChunkFilter,
}

/// A chunk together with the distance the store measured.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMatch {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Read access to embedded chunks.
#[async_trait]
pub trait VectorStore: Send + Sync + std::fmt::Debug {
    /// Store name used in errors and logs.
    fn name(&self) -> &str;

    /// Metric the store reports distances in.
    fn distance_metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }

    /// Whether the server-side search function is available.
    async fn supports_indexed_search(&self) -> AppResult<bool>;

    /// Server-side filtered similarity search, nearest first.
    async fn match_chunks(&self, request: &MatchRequest) -> AppResult<Vec<StoreMatch>>;

    /// Server-side filtered fetch of every active chunk, vectors included.
    async fn scan_chunks(&self, filter: &ChunkFilter) -> AppResult<Vec<Chunk>>;
}

/// The currently served generation of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub version: u32,
    /// Hash of the full source content the generation was built from
    pub content_hash: String,
}

/// Write access used by the indexer.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn active_generation(&self, key: &SourceKey) -> AppResult<Option<Generation>>;

    /// Store a new generation; it becomes active if its version is highest.
    async fn write_generation(
        &self,
        key: &SourceKey,
        generation: Generation,
        chunks: Vec<Chunk>,
    ) -> AppResult<()>;

    /// Drop the newest generation so the previous one is served again.
    /// Returns the version that is active afterwards.
    async fn rollback_generation(&self, key: &SourceKey) -> AppResult<Option<u32>>;

    /// Remove every generation of a source. Returns the number of chunks removed.
    async fn delete_source(&self, key: &SourceKey) -> AppResult<usize>;
}
