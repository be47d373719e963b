//! Per-call retrieval policy.
//!
//! A [`RetrievalPolicy`] is built once per request (usually from the site's
//! [`RetrievalSettings`]) and threaded through every stage, so no stage
//! carries its own inline defaults.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use storechat_core::config::DEFAULT_EMBEDDING_MODEL;
use storechat_core::{AppResult, RetrievalSettings, ValidationError};

use crate::types::SourceType;

/// Default minimum similarity for a chunk to count as relevant.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Default number of chunks requested from the vector store.
pub const DEFAULT_TOP_K: usize = 10;

pub const DEFAULT_MAX_TOKENS: usize = 4000;

pub const DEFAULT_MAX_SOURCES: usize = 5;

pub const DEFAULT_MAX_CHUNKS_PER_SOURCE: usize = 3;

/// How requested source types outside the allowlist are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTypeEnforcement {
    /// Reject the request with a validation error
    Strict,
    /// Drop the offending types and continue
    Sanitize,
}

/// Source-type allowlist and its enforcement mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub allowed_source_types: BTreeSet<SourceType>,
    pub enforcement: SourceTypeEnforcement,
}

impl GuardrailPolicy {
    /// All known types allowed; anything else is a hard failure.
    pub fn strict() -> Self {
        Self {
            allowed_source_types: SourceType::ALL.into_iter().collect(),
            enforcement: SourceTypeEnforcement::Strict,
        }
    }

    /// All known types allowed; unknown or disallowed types are dropped.
    pub fn permissive() -> Self {
        Self {
            allowed_source_types: SourceType::ALL.into_iter().collect(),
            enforcement: SourceTypeEnforcement::Sanitize,
        }
    }

    pub fn with_allowed(mut self, types: impl IntoIterator<Item = SourceType>) -> Self {
        self.allowed_source_types = types.into_iter().collect();
        self
    }

    pub fn allows(&self, source_type: SourceType) -> bool {
        self.allowed_source_types.contains(&source_type)
    }
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

/// Size budget for the assembled context. The two modes are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextBudget {
    Tokens(usize),
    Characters(usize),
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::Tokens(DEFAULT_MAX_TOKENS)
    }
}

/// How the chunks of one source are combined into a context block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Join chunk texts with a blank line, in chunk-index order
    #[default]
    Concatenate,
    /// Keep each chunk as its own segment
    Separate,
}

/// Limits applied by the context builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLimits {
    pub budget: ContextBudget,
    pub max_sources: usize,
    pub max_chunks_per_source: usize,
    pub merge_strategy: MergeStrategy,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            budget: ContextBudget::default(),
            max_sources: DEFAULT_MAX_SOURCES,
            max_chunks_per_source: DEFAULT_MAX_CHUNKS_PER_SOURCE,
            merge_strategy: MergeStrategy::default(),
        }
    }
}

/// Immutable bundle of limits and allowlists governing one retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPolicy {
    pub guardrail: GuardrailPolicy,
    pub similarity_threshold: f32,
    pub top_k: usize,
    pub embedding_model: String,
    pub context: ContextLimits,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            guardrail: GuardrailPolicy::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            context: ContextLimits::default(),
        }
    }
}

impl RetrievalPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a validated policy from plain site settings.
    pub fn from_settings(settings: &RetrievalSettings) -> AppResult<Self> {
        let allowed = settings
            .allowed_source_types
            .iter()
            .map(|name| name.parse::<SourceType>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        let enforcement = match settings.source_type_enforcement.to_lowercase().as_str() {
            "strict" => SourceTypeEnforcement::Strict,
            "sanitize" | "permissive" => SourceTypeEnforcement::Sanitize,
            other => {
                return Err(ValidationError::InvalidPolicy(format!(
                    "unknown source type enforcement '{}'",
                    other
                ))
                .into())
            }
        };

        let budget = match (settings.max_characters, settings.max_tokens) {
            (Some(chars), _) => ContextBudget::Characters(chars),
            (None, Some(tokens)) => ContextBudget::Tokens(tokens),
            (None, None) => ContextBudget::default(),
        };

        let merge_strategy = match settings.merge_strategy.to_lowercase().as_str() {
            "concatenate" => MergeStrategy::Concatenate,
            "separate" => MergeStrategy::Separate,
            other => {
                return Err(ValidationError::InvalidPolicy(format!(
                    "unknown merge strategy '{}'",
                    other
                ))
                .into())
            }
        };

        let policy = Self {
            guardrail: GuardrailPolicy {
                allowed_source_types: allowed,
                enforcement,
            },
            similarity_threshold: settings.similarity_threshold,
            top_k: settings.top_k,
            embedding_model: settings
                .embedding_model
                .clone()
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            context: ContextLimits {
                budget,
                max_sources: settings.max_sources,
                max_chunks_per_source: settings.max_chunks_per_source,
                merge_strategy,
            },
        };

        policy.validate()?;
        Ok(policy)
    }

    pub fn with_guardrail(mut self, guardrail: GuardrailPolicy) -> Self {
        self.guardrail = guardrail;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.context.budget = budget;
        self
    }

    pub fn with_max_sources(mut self, max_sources: usize) -> Self {
        self.context.max_sources = max_sources;
        self
    }

    pub fn with_max_chunks_per_source(mut self, max_chunks: usize) -> Self {
        self.context.max_chunks_per_source = max_chunks;
        self
    }

    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.context.merge_strategy = strategy;
        self
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ValidationError::InvalidPolicy(format!(
                "similarity threshold {} is outside [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.top_k == 0 {
            return Err(ValidationError::InvalidPolicy(
                "top-k must be positive".to_string(),
            ));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(ValidationError::InvalidPolicy(
                "embedding model is empty".to_string(),
            ));
        }
        if self.context.max_sources == 0 || self.context.max_chunks_per_source == 0 {
            return Err(ValidationError::InvalidPolicy(
                "source and per-source chunk caps must be positive".to_string(),
            ));
        }
        if let ContextBudget::Tokens(0) | ContextBudget::Characters(0) = self.context.budget {
            return Err(ValidationError::InvalidPolicy(
                "context budget must be positive".to_string(),
            ));
        }
        if self.guardrail.allowed_source_types.is_empty() {
            return Err(ValidationError::InvalidPolicy(
                "at least one source type must be allowed".to_string(),
            ));
        }
        Ok(())
    }
}
