//! Citation records for answers.
//!
//! Evidence is metadata only: no chunk text, so it stays small enough to be
//! stored next to the chat message it informed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ContextBlock;
use crate::types::{RetrievedChunk, SourceType};

/// One cited source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub source_type: SourceType,
    pub source_id: String,
    pub chunk_ids: Vec<String>,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_updated_at: Option<DateTime<Utc>>,
}

impl From<&ContextBlock> for Evidence {
    fn from(block: &ContextBlock) -> Self {
        Self {
            source_type: block.source_type,
            source_id: block.source_id.clone(),
            chunk_ids: block.chunk_ids.clone(),
            score: block.best_score,
            title: block.title.clone(),
            url: block.url.clone(),
            source_updated_at: block.source_updated_at,
        }
    }
}

/// One record per context block, in block order.
pub fn evidence_from_blocks(blocks: &[ContextBlock]) -> Vec<Evidence> {
    blocks.iter().map(Evidence::from).collect()
}

/// One record per source for callers that skip context building.
///
/// Records are ordered by best score, ties in first-appearance order; chunk
/// ids are listed in chunk-index order.
pub fn evidence_from_chunks(chunks: &[RetrievedChunk]) -> Vec<Evidence> {
    let mut index: HashMap<(SourceType, &str), usize> = HashMap::new();
    let mut grouped: Vec<(Evidence, Vec<(u32, &str)>)> = Vec::new();

    for retrieved in chunks {
        let chunk = &retrieved.chunk;
        let slot = *index
            .entry((chunk.source_type, chunk.source_id.as_str()))
            .or_insert_with(|| {
                grouped.push((
                    Evidence {
                        source_type: chunk.source_type,
                        source_id: chunk.source_id.clone(),
                        chunk_ids: Vec::new(),
                        score: retrieved.similarity,
                        title: None,
                        url: None,
                        source_updated_at: None,
                    },
                    Vec::new(),
                ));
                grouped.len() - 1
            });

        let (evidence, members) = &mut grouped[slot];
        if members.iter().any(|(_, id)| *id == chunk.id) {
            continue;
        }
        members.push((chunk.chunk_index, chunk.id.as_str()));
        evidence.score = evidence.score.max(retrieved.similarity);
        evidence.title = evidence.title.take().or_else(|| chunk.title.clone());
        evidence.url = evidence.url.take().or_else(|| chunk.url.clone());
        evidence.source_updated_at = evidence.source_updated_at.max(chunk.source_updated_at);
    }

    let mut records: Vec<Evidence> = grouped
        .into_iter()
        .map(|(mut evidence, mut members)| {
            members.sort_by_key(|(chunk_index, _)| *chunk_index);
            evidence.chunk_ids = members.into_iter().map(|(_, id)| id.to_string()).collect();
            evidence
        })
        .collect();

    records.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    records
}
