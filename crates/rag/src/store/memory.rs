//! In-memory [`VectorStore`] and [`ChunkSink`] for tests and local corpora.
//!
//! Every generation of a source is kept; reads only see the highest version.
//! Search is brute force over the active chunks using the configured metric.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use storechat_core::{AppError, AppResult, ProviderError};

use super::{ChunkFilter, ChunkSink, Generation, MatchRequest, StoreMatch, VectorStore};
use crate::similarity::DistanceMetric;
use crate::types::{Chunk, SourceKey};

const STORE_NAME: &str = "memory";

#[derive(Debug, Clone)]
struct StoredGeneration {
    version: u32,
    content_hash: String,
    chunks: Vec<Chunk>,
}

type Generations = BTreeMap<SourceKey, Vec<StoredGeneration>>;

/// In-memory chunk store.
#[derive(Debug)]
pub struct InMemoryVectorStore {
    /// Generations per source, ascending by version
    sources: RwLock<Generations>,
    indexed: bool,
    metric: DistanceMetric,
    reads: AtomicUsize,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(BTreeMap::new()),
            indexed: true,
            metric: DistanceMetric::Cosine,
            reads: AtomicUsize::new(0),
        }
    }

    /// A store whose server-side search function is unavailable, forcing
    /// callers onto the scan path.
    pub fn without_index() -> Self {
        Self {
            indexed: false,
            ..Self::new()
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Insert chunks directly, bypassing the indexer.
    ///
    /// Chunks are grouped into the generation named by their `version`.
    pub fn insert(&self, chunks: impl IntoIterator<Item = Chunk>) -> AppResult<()> {
        let mut sources = self.write()?;
        for chunk in chunks {
            let generations = sources.entry(chunk.source_key()).or_default();
            match generations.iter_mut().find(|g| g.version == chunk.version) {
                Some(generation) => generation.chunks.push(chunk),
                None => {
                    generations.push(StoredGeneration {
                        version: chunk.version,
                        content_hash: String::new(),
                        chunks: vec![chunk],
                    });
                    generations.sort_by_key(|g| g.version);
                }
            }
        }
        Ok(())
    }

    /// Number of read calls (`match_chunks` and `scan_chunks`) served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of chunks in active generations.
    pub fn active_len(&self) -> AppResult<usize> {
        let sources = self.read()?;
        Ok(active_chunks(&sources).count())
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Generations>> {
        self.sources
            .read()
            .map_err(|_| AppError::Other("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Generations>> {
        self.sources
            .write()
            .map_err(|_| AppError::Other("memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn active_chunks(sources: &Generations) -> impl Iterator<Item = &Chunk> {
    sources
        .values()
        .filter_map(|generations| generations.last())
        .flat_map(|generation| generation.chunks.iter())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    fn distance_metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn supports_indexed_search(&self) -> AppResult<bool> {
        Ok(self.indexed)
    }

    async fn match_chunks(&self, request: &MatchRequest) -> AppResult<Vec<StoreMatch>> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if !self.indexed {
            return Err(ProviderError::permanent(STORE_NAME, "search function is not installed").into());
        }

        let sources = self.read()?;
        let mut matches: Vec<StoreMatch> = active_chunks(&sources)
            .filter(|chunk| request.filter.matches(chunk))
            .filter_map(|chunk| {
                let distance = self.metric.distance(&request.query_vector, &chunk.embedding)?;
                (distance <= request.max_distance).then(|| StoreMatch {
                    chunk: chunk.clone(),
                    distance,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(request.top_k);

        Ok(matches)
    }

    async fn scan_chunks(&self, filter: &ChunkFilter) -> AppResult<Vec<Chunk>> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let sources = self.read()?;
        Ok(active_chunks(&sources)
            .filter(|chunk| filter.matches(chunk))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChunkSink for InMemoryVectorStore {
    async fn active_generation(&self, key: &SourceKey) -> AppResult<Option<Generation>> {
        let sources = self.read()?;
        Ok(sources
            .get(key)
            .and_then(|generations| generations.last())
            .map(|g| Generation {
                version: g.version,
                content_hash: g.content_hash.clone(),
            }))
    }

    async fn write_generation(
        &self,
        key: &SourceKey,
        generation: Generation,
        chunks: Vec<Chunk>,
    ) -> AppResult<()> {
        let mut sources = self.write()?;
        let generations = sources.entry(key.clone()).or_default();
        generations.retain(|g| g.version != generation.version);
        generations.push(StoredGeneration {
            version: generation.version,
            content_hash: generation.content_hash,
            chunks,
        });
        generations.sort_by_key(|g| g.version);
        Ok(())
    }

    async fn rollback_generation(&self, key: &SourceKey) -> AppResult<Option<u32>> {
        let mut sources = self.write()?;
        let Some(generations) = sources.get_mut(key) else {
            return Ok(None);
        };

        generations.pop();
        let active = generations.last().map(|g| g.version);
        if generations.is_empty() {
            sources.remove(key);
        }
        Ok(active)
    }

    async fn delete_source(&self, key: &SourceKey) -> AppResult<usize> {
        let mut sources = self.write()?;
        Ok(sources
            .remove(key)
            .map(|generations| generations.iter().map(|g| g.chunks.len()).sum())
            .unwrap_or(0))
    }
}
