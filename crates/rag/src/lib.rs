//! Tenant-scoped retrieval-augmented generation core.
//!
//! A request passes the guardrail, is embedded and searched inside its
//! tenant/site scope, and the matches are folded into budgeted context
//! blocks, citation evidence and ready-to-send prompts.

pub mod context;
pub mod embeddings;
pub mod evidence;
pub mod guardrail;
mod http;
pub mod indexer;
pub mod pipeline;
pub mod policy;
pub mod prompt;
pub mod retriever;
pub mod search;
pub mod similarity;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

pub use context::{
    build_context, render_sections, ApproximateTokenCounter, BlockContent, ContextBlock,
    ContextBuilder, TokenCounter,
};
pub use embeddings::{create_provider, EmbeddingProvider, MockProvider, OpenAiProvider};
pub use evidence::{evidence_from_blocks, evidence_from_chunks, Evidence};
pub use guardrail::{sanitize_source_types, validate_scope, RetrievalScope};
pub use indexer::{IndexOutcome, Indexer, SourceDocument};
pub use pipeline::{RagOutput, RagPipeline, RagRequest};
pub use policy::{
    ContextBudget, ContextLimits, GuardrailPolicy, MergeStrategy, RetrievalPolicy,
    SourceTypeEnforcement,
};
pub use prompt::{AssembledPrompt, ChatMessage, ChatRole, PromptAssembler};
pub use retriever::Retriever;
pub use search::{select_strategy, IndexedSearch, LinearScan, SearchStrategy};
pub use similarity::DistanceMetric;
pub use store::{
    ChunkFilter, ChunkSink, InMemoryVectorStore, MatchRequest, RestVectorStore, StoreMatch,
    VectorStore,
};
pub use types::{Chunk, RetrievedChunk, SourceKey, SourceType};
