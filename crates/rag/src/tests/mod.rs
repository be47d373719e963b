//! Cross-module tests: end-to-end scenarios and retrieval properties.


use std::sync::Arc;

use crate::embeddings::MockProvider;
use crate::pipeline::RagPipeline;
use crate::prompt::PromptAssembler;
use crate::store::InMemoryVectorStore;
use crate::types::{Chunk, RetrievedChunk, SourceType};

pub(crate) const DIMENSIONS: usize = 4;

/// Query text the mock embedder maps to the first unit axis.
pub(crate) const QUERY: &str = "wireless headphones";

pub(crate) fn query_vector() -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSIONS];
    vector[0] = 1.0;
    vector
}

/// Unit vector whose cosine-derived similarity to [`query_vector`] is exactly
/// `similarity`.
pub(crate) fn vector_with_similarity(similarity: f32) -> Vec<f32> {
    let cosine = 2.0 * similarity - 1.0;
    let mut vector = vec![0.0; DIMENSIONS];
    vector[0] = cosine;
    vector[1] = (1.0 - cosine * cosine).max(0.0).sqrt();
    vector
}

pub(crate) struct ChunkFixture<'a> {
    pub tenant: &'a str,
    pub site: &'a str,
    pub source_type: SourceType,
    pub source_id: &'a str,
    pub index: u32,
    pub similarity: f32,
    pub text: &'a str,
}

impl<'a> ChunkFixture<'a> {
    pub fn new(source_id: &'a str, index: u32, similarity: f32, text: &'a str) -> Self {
        Self {
            tenant: "tenant-a",
            site: "site-1",
            source_type: SourceType::Product,
            source_id,
            index,
            similarity,
            text,
        }
    }

    pub fn tenant(mut self, tenant: &'a str) -> Self {
        self.tenant = tenant;
        self
    }

    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn build(&self) -> Chunk {
        Chunk {
            id: format!("{}:{}:{}#{}", self.tenant, self.site, self.source_id, self.index),
            tenant_id: self.tenant.to_string(),
            site_id: self.site.to_string(),
            source_type: self.source_type,
            source_id: self.source_id.to_string(),
            version: 1,
            chunk_index: self.index,
            text: self.text.to_string(),
            content_hash: crate::indexer::content_hash(self.text),
            embedding: vector_with_similarity(self.similarity),
            title: Some(self.source_id.to_string()),
            url: None,
            source_updated_at: None,
        }
    }

    /// As retrieval would return it: scored and without its vector.
    pub fn retrieved(&self) -> RetrievedChunk {
        let mut chunk = self.build();
        chunk.embedding.clear();
        RetrievedChunk {
            chunk,
            similarity: self.similarity,
        }
    }
}

pub(crate) struct Fixture {
    pub pipeline: RagPipeline,
    pub embedder: Arc<MockProvider>,
    pub store: Arc<InMemoryVectorStore>,
}

pub(crate) async fn fixture(chunks: Vec<Chunk>, indexed: bool) -> Fixture {
    let embedder = Arc::new(MockProvider::new(DIMENSIONS).with_fixed(QUERY, query_vector()));
    let store = Arc::new(if indexed {
        InMemoryVectorStore::new()
    } else {
        InMemoryVectorStore::without_index()
    });
    store.insert(chunks).unwrap();

    let pipeline = RagPipeline::connect(
        embedder.clone(),
        store.clone(),
        PromptAssembler::default().with_variable("storeName", "Acme Audio"),
    )
    .await
    .unwrap();

    Fixture {
        pipeline,
        embedder,
        store,
    }
}
