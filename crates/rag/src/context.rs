//! Context building: retrieved chunks → budgeted, per-source context blocks.
//!
//! Chunks are grouped by source, deduplicated, capped per source, ranked by
//! each source's best score, capped by source count, merged, and finally
//! walked against the size budget. Each block is measured as the numbered
//! prompt section it becomes, separators included, so the serialized context
//! stays within budget. The walk never splits a block: a block is either
//! included whole or the walk stops. The first block is always kept, even
//! when it alone is over budget.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::policy::{ContextBudget, ContextLimits, MergeStrategy};
use crate::types::{RetrievedChunk, SourceType};

/// Separator between chunk texts of one source.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Separator between serialized context sections.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// Estimates how many tokens a text costs.
pub trait TokenCounter: Send + Sync + std::fmt::Debug {
    fn count(&self, text: &str) -> usize;
}

/// Roughly four characters per token.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateTokenCounter;

impl ApproximateTokenCounter {
    const CHARS_PER_TOKEN: usize = 4;
}

impl TokenCounter for ApproximateTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(Self::CHARS_PER_TOKEN)
    }
}

/// Text of one context block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockContent {
    /// Chunk texts joined with a blank line
    Merged(String),
    /// Chunk texts kept apart
    Segments(Vec<String>),
}

impl BlockContent {
    /// The block as it is serialized into a prompt.
    pub fn text(&self) -> String {
        match self {
            Self::Merged(text) => text.clone(),
            Self::Segments(segments) => segments.join(CHUNK_SEPARATOR),
        }
    }
}

/// One source document's contribution to the prompt context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBlock {
    pub source_type: SourceType,
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_updated_at: Option<DateTime<Utc>>,
    /// Ids of the merged chunks, in chunk-index order
    pub chunk_ids: Vec<String>,
    /// Best similarity among the merged chunks
    pub best_score: f32,
    pub content: BlockContent,
}

impl ContextBlock {
    pub fn text(&self) -> String {
        self.content.text()
    }

    /// The block as prompt section `number`: a labeled header, the URL when
    /// known, then the text.
    pub fn render_section(&self, number: usize) -> String {
        let mut section = match &self.title {
            Some(title) => format!("[{}] {}: {}", number, self.source_type.label(), title),
            None => format!("[{}] {} {}", number, self.source_type.label(), self.source_id),
        };
        if let Some(url) = &self.url {
            section.push_str("\nURL: ");
            section.push_str(url);
        }
        section.push('\n');
        section.push_str(&self.text());
        section
    }
}

/// Serialize blocks as numbered sections separated by blank lines.
pub fn render_sections(blocks: &[ContextBlock]) -> String {
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| block.render_section(i + 1))
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

/// Chunks of one source, before merging.
struct SourceGroup<'a> {
    source_type: SourceType,
    source_id: &'a str,
    chunks: Vec<&'a RetrievedChunk>,
    best_score: f32,
}

/// Builds context blocks under a set of [`ContextLimits`].
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    limits: ContextLimits,
    counter: Arc<dyn TokenCounter>,
}

impl ContextBuilder {
    pub fn new(limits: ContextLimits) -> Self {
        Self {
            limits,
            counter: Arc::new(ApproximateTokenCounter),
        }
    }

    /// Use an exact tokenizer instead of the character estimate.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Size of `text` in the unit of the configured budget.
    pub fn measure(&self, text: &str) -> usize {
        match self.limits.budget {
            ContextBudget::Tokens(_) => self.counter.count(text),
            ContextBudget::Characters(_) => text.chars().count(),
        }
    }

    fn budget(&self) -> usize {
        match self.limits.budget {
            ContextBudget::Tokens(limit) | ContextBudget::Characters(limit) => limit,
        }
    }

    pub fn build(&self, chunks: &[RetrievedChunk]) -> Vec<ContextBlock> {
        let mut groups = self.group(chunks);

        // Stable: equal scores keep first-appearance order
        groups.sort_by(|a, b| {
            b.best_score
                .partial_cmp(&a.best_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let grouped = groups.len();
        groups.truncate(self.limits.max_sources);

        let budget = self.budget();
        let mut used = 0;
        let mut blocks = Vec::with_capacity(groups.len());

        for group in groups {
            let block = self.merge(group);
            let mut size = self.measure(&block.render_section(blocks.len() + 1));
            if !blocks.is_empty() {
                size += self.measure(SECTION_SEPARATOR);
            }

            if !blocks.is_empty() && used + size > budget {
                break;
            }
            used += size;
            blocks.push(block);
        }

        debug!(
            chunks = chunks.len(),
            sources = grouped,
            blocks = blocks.len(),
            used,
            budget,
            "Built context"
        );
        blocks
    }

    /// Group by source in first-appearance order, drop duplicate chunks, keep
    /// the lowest chunk indices up to the per-source cap.
    fn group<'a>(&self, chunks: &'a [RetrievedChunk]) -> Vec<SourceGroup<'a>> {
        let mut index: HashMap<(SourceType, &'a str), usize> = HashMap::new();
        let mut groups: Vec<SourceGroup<'a>> = Vec::new();
        let mut seen_ids: HashSet<&'a str> = HashSet::new();
        let mut seen_hashes: HashSet<(SourceType, &'a str, &'a str)> = HashSet::new();

        for retrieved in chunks {
            let chunk = &retrieved.chunk;
            if !seen_ids.insert(chunk.id.as_str()) {
                continue;
            }
            if !chunk.content_hash.is_empty()
                && !seen_hashes.insert((
                    chunk.source_type,
                    chunk.source_id.as_str(),
                    chunk.content_hash.as_str(),
                ))
            {
                continue;
            }

            let key = (chunk.source_type, chunk.source_id.as_str());
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(SourceGroup {
                    source_type: chunk.source_type,
                    source_id: chunk.source_id.as_str(),
                    chunks: Vec::new(),
                    best_score: 0.0,
                });
                groups.len() - 1
            });
            groups[slot].chunks.push(retrieved);
        }

        for group in &mut groups {
            group.chunks.sort_by_key(|r| r.chunk.chunk_index);
            group.chunks.truncate(self.limits.max_chunks_per_source);
            group.best_score = group
                .chunks
                .iter()
                .map(|r| r.similarity)
                .fold(0.0, f32::max);
        }

        groups
    }

    fn merge(&self, group: SourceGroup<'_>) -> ContextBlock {
        let texts: Vec<String> = group.chunks.iter().map(|r| r.chunk.text.clone()).collect();
        let content = match self.limits.merge_strategy {
            MergeStrategy::Concatenate => BlockContent::Merged(texts.join(CHUNK_SEPARATOR)),
            MergeStrategy::Separate => BlockContent::Segments(texts),
        };

        ContextBlock {
            source_type: group.source_type,
            source_id: group.source_id.to_string(),
            title: group.chunks.iter().find_map(|r| r.chunk.title.clone()),
            url: group.chunks.iter().find_map(|r| r.chunk.url.clone()),
            source_updated_at: group
                .chunks
                .iter()
                .filter_map(|r| r.chunk.source_updated_at)
                .max(),
            chunk_ids: group.chunks.iter().map(|r| r.chunk.id.clone()).collect(),
            best_score: group.best_score,
            content,
        }
    }
}

/// Build context blocks with the default token counter.
pub fn build_context(chunks: &[RetrievedChunk], limits: &ContextLimits) -> Vec<ContextBlock> {
    ContextBuilder::new(limits.clone()).build(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn retrieved(source: &str, index: u32, similarity: f32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: format!("{}#{}", source, index),
                tenant_id: "t1".to_string(),
                site_id: "s1".to_string(),
                source_type: SourceType::Product,
                source_id: source.to_string(),
                version: 1,
                chunk_index: index,
                text: text.to_string(),
                content_hash: format!("{}-{}", source, text),
                embedding: Vec::new(),
                title: Some(format!("{} title", source)),
                url: None,
                source_updated_at: None,
            },
            similarity,
        }
    }

    fn limits() -> ContextLimits {
        ContextLimits::default()
    }

    #[test]
    fn test_approximate_token_counter_rounds_up() {
        let counter = ApproximateTokenCounter;
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count("abcde"), 2);
    }

    #[test]
    fn test_same_source_chunks_merge_in_index_order() {
        let chunks = vec![
            retrieved("p1", 1, 0.8, "Second part."),
            retrieved("p1", 0, 0.9, "First part."),
        ];

        let blocks = build_context(&chunks, &limits());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text(), "First part.\n\nSecond part.");
        assert_eq!(blocks[0].chunk_ids, vec!["p1#0", "p1#1"]);
        assert!((blocks[0].best_score - 0.9).abs() < 1e-6);
        assert_eq!(blocks[0].title.as_deref(), Some("p1 title"));
    }

    #[test]
    fn test_per_source_cap_keeps_lowest_indices() {
        let chunks: Vec<_> = (0..5)
            .rev()
            .map(|i| retrieved("p1", i, 0.7 + i as f32 * 0.05, &format!("part {}", i)))
            .collect();

        let limits = ContextLimits {
            max_chunks_per_source: 2,
            ..limits()
        };
        let blocks = build_context(&chunks, &limits);
        assert_eq!(blocks[0].chunk_ids, vec!["p1#0", "p1#1"]);
        // Best score is computed over the kept chunks only
        assert!((blocks[0].best_score - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let mut copy = retrieved("p1", 1, 0.8, "Same text");
        copy.chunk.id = "p1#copy".to_string();
        let chunks = vec![
            retrieved("p1", 0, 0.9, "Same text"),
            retrieved("p1", 0, 0.9, "Same text"),
            copy,
        ];

        let blocks = build_context(&chunks, &limits());
        assert_eq!(blocks[0].chunk_ids, vec!["p1#0"]);
    }

    #[test]
    fn test_sources_ranked_and_capped() {
        let chunks = vec![
            retrieved("a", 0, 0.75, "a"),
            retrieved("b", 0, 0.95, "b"),
            retrieved("c", 0, 0.80, "c"),
            retrieved("d", 0, 0.90, "d"),
            retrieved("e", 0, 0.72, "e"),
        ];

        let limits = ContextLimits {
            max_sources: 2,
            ..limits()
        };
        let blocks = build_context(&chunks, &limits);
        let ids: Vec<_> = blocks.iter().map(|b| b.source_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[test]
    fn test_ties_keep_first_appearance() {
        let chunks = vec![
            retrieved("x", 0, 0.8, "x"),
            retrieved("y", 0, 0.8, "y"),
            retrieved("z", 0, 0.8, "z"),
        ];
        let blocks = build_context(&chunks, &limits());
        let ids: Vec<_> = blocks.iter().map(|b| b.source_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_budget_stops_at_first_block_that_does_not_fit() {
        let chunks = vec![
            retrieved("a", 0, 0.9, &"a".repeat(40)),
            retrieved("b", 0, 0.8, &"b".repeat(40)),
            retrieved("c", 0, 0.7, &"c".repeat(10)),
        ];

        let limits = ContextLimits {
            budget: ContextBudget::Characters(60),
            ..limits()
        };
        let blocks = build_context(&chunks, &limits);
        // "c" would fit on its own but the walk stops at "b"
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source_id, "a");
    }

    #[test]
    fn test_budget_counts_section_headers_and_separators() {
        let chunk = |source: &str| {
            let mut r = retrieved(source, 0, 0.9, &"w".repeat(45));
            r.chunk.url = Some(format!("https://shop.example.com/{}", source));
            r
        };
        let chunks = vec![chunk("a"), chunk("b")];

        let unbounded = build_context(&chunks, &limits());
        assert_eq!(unbounded.len(), 2);
        let full = render_sections(&unbounded).chars().count();

        let exact = ContextLimits {
            budget: ContextBudget::Characters(full),
            ..limits()
        };
        let blocks = build_context(&chunks, &exact);
        assert_eq!(blocks.len(), 2);
        assert_eq!(render_sections(&blocks).chars().count(), full);

        let one_short = ContextLimits {
            budget: ContextBudget::Characters(full - 1),
            ..limits()
        };
        assert_eq!(build_context(&chunks, &one_short).len(), 1);

        // Both texts together fit in 100 characters, their sections do not
        let tight = ContextLimits {
            budget: ContextBudget::Characters(100),
            ..limits()
        };
        let blocks = build_context(&chunks, &tight);
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_render_section_layout() {
        let mut r = retrieved("p1", 0, 0.9, "Wireless.");
        r.chunk.url = Some("https://shop.example.com/p1".to_string());
        let blocks = build_context(&[r], &limits());

        assert_eq!(
            blocks[0].render_section(3),
            "[3] Product: p1 title\nURL: https://shop.example.com/p1\nWireless."
        );
        let mut untitled = blocks[0].clone();
        untitled.title = None;
        untitled.url = None;
        assert_eq!(untitled.render_section(1), "[1] Product p1\nWireless.");
    }

    #[test]
    fn test_oversized_first_block_still_included() {
        let chunks = vec![
            retrieved("big", 0, 0.9, &"x".repeat(500)),
            retrieved("small", 0, 0.8, "tiny"),
        ];

        let limits = ContextLimits {
            budget: ContextBudget::Tokens(10),
            ..limits()
        };
        let blocks = build_context(&chunks, &limits);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text().len(), 500);
    }

    #[test]
    fn test_separate_strategy_keeps_segments() {
        let chunks = vec![
            retrieved("p1", 0, 0.9, "one"),
            retrieved("p1", 1, 0.8, "two"),
        ];
        let limits = ContextLimits {
            merge_strategy: MergeStrategy::Separate,
            ..limits()
        };

        let blocks = build_context(&chunks, &limits);
        assert_eq!(
            blocks[0].content,
            BlockContent::Segments(vec!["one".to_string(), "two".to_string()])
        );
    }

    #[derive(Debug)]
    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    #[test]
    fn test_custom_token_counter() {
        let chunks = vec![
            retrieved("a", 0, 0.9, "one two three"),
            retrieved("b", 0, 0.8, "four five"),
        ];
        let limits = ContextLimits {
            budget: ContextBudget::Tokens(4),
            ..limits()
        };

        let builder = ContextBuilder::new(limits).with_token_counter(Arc::new(WordCounter));
        assert_eq!(builder.measure("one two"), 2);
        assert_eq!(builder.build(&chunks).len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(build_context(&[], &limits()).is_empty());
    }
}
