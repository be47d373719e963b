//! Ingestion side of the chunk lifecycle.
//!
//! A changed source document is split, embedded and written as a new
//! generation; the previous generation stays in the store for rollback but is
//! no longer served. Unchanged content (same SHA-256) is skipped without an
//! embedding call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use storechat_core::{AppResult, ProviderError, ValidationError};
use text_splitter::TextSplitter;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::embeddings::EmbeddingProvider;
use crate::store::{ChunkSink, Generation};
use crate::types::{Chunk, SourceKey, SourceType};

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Store content as reported by the ingestion webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub tenant_id: String,
    pub site_id: String,
    pub source_type: SourceType,
    pub source_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub content: String,
}

impl SourceDocument {
    pub fn key(&self) -> SourceKey {
        SourceKey {
            tenant_id: self.tenant_id.clone(),
            site_id: self.site_id.clone(),
            source_type: self.source_type,
            source_id: self.source_id.clone(),
        }
    }
}

/// Result of indexing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum IndexOutcome {
    /// Content hash matched the active generation
    Unchanged { version: u32 },
    /// A new generation was written and is now served
    Indexed { version: u32, chunks: usize },
    /// The document had no text; every generation was removed
    Removed { chunks: usize },
}

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Splits, embeds and versions source documents.
pub struct Indexer {
    embedder: Arc<dyn EmbeddingProvider>,
    sink: Arc<dyn ChunkSink>,
    model: String,
    chunk_size: usize,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        sink: Arc<dyn ChunkSink>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            sink,
            model: model.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn split(&self, content: &str) -> Vec<String> {
        TextSplitter::new(self.chunk_size)
            .chunks(content)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[instrument(skip(self, document), fields(source_id = %document.source_id, source_type = %document.source_type))]
    pub async fn index_document(&self, document: &SourceDocument) -> AppResult<IndexOutcome> {
        if document.tenant_id.trim().is_empty() {
            return Err(ValidationError::MissingTenant.into());
        }
        if document.site_id.trim().is_empty() {
            return Err(ValidationError::MissingSite.into());
        }

        let key = document.key();
        let hash = content_hash(&document.content);
        let active = self.sink.active_generation(&key).await?;

        if let Some(active) = &active {
            if active.content_hash == hash {
                debug!(version = active.version, "Content unchanged; skipping");
                return Ok(IndexOutcome::Unchanged {
                    version: active.version,
                });
            }
        }

        let texts = self.split(&document.content);
        if texts.is_empty() {
            let chunks = self.remove_document(&key).await?;
            return Ok(IndexOutcome::Removed { chunks });
        }

        let embeddings = self.embedder.embed_batch(&texts, &self.model).await?;
        if embeddings.len() != texts.len() {
            return Err(ProviderError::permanent(
                self.embedder.provider_name(),
                format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    embeddings.len()
                ),
            )
            .into());
        }

        let version = active.map(|g| g.version + 1).unwrap_or(1);
        let chunks: Vec<Chunk> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (text, embedding))| Chunk {
                id: Uuid::new_v4().to_string(),
                tenant_id: document.tenant_id.clone(),
                site_id: document.site_id.clone(),
                source_type: document.source_type,
                source_id: document.source_id.clone(),
                version,
                chunk_index: index as u32,
                content_hash: content_hash(&text),
                text,
                embedding,
                title: document.title.clone(),
                url: document.url.clone(),
                source_updated_at: document.updated_at,
            })
            .collect();

        let count = chunks.len();
        self.sink
            .write_generation(
                &key,
                Generation {
                    version,
                    content_hash: hash,
                },
                chunks,
            )
            .await?;

        info!(version, chunks = count, "Indexed source document");
        Ok(IndexOutcome::Indexed {
            version,
            chunks: count,
        })
    }

    /// Delete every generation of a source.
    pub async fn remove_document(&self, key: &SourceKey) -> AppResult<usize> {
        let removed = self.sink.delete_source(key).await?;
        info!(source_id = %key.source_id, removed, "Removed source document");
        Ok(removed)
    }

    /// Serve the previous generation again. Returns the now-active version.
    pub async fn rollback_document(&self, key: &SourceKey) -> AppResult<Option<u32>> {
        let active = self.sink.rollback_generation(key).await?;
        info!(source_id = %key.source_id, ?active, "Rolled back source document");
        Ok(active)
    }
}
