//! Single entry point for a retrieval-augmented request.
//!
//! Guardrail → retriever → context builder → evidence + prompt. Any stage
//! failing ends the run with that error; no partial output is returned.
//! Dropping the future returned by [`RagPipeline::run`] cancels whichever
//! embedding or search request is in flight.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storechat_core::{AppError, AppResult};
use tracing::{debug, info_span, Instrument};

use crate::context::{ContextBlock, ContextBuilder};
use crate::embeddings::EmbeddingProvider;
use crate::evidence::{evidence_from_blocks, Evidence};
use crate::guardrail::validate_scope;
use crate::policy::RetrievalPolicy;
use crate::prompt::{AssembledPrompt, ChatMessage, PromptAssembler};
use crate::retriever::Retriever;
use crate::search::select_strategy;
use crate::store::VectorStore;
use crate::types::RetrievedChunk;

/// One chat query from the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRequest {
    pub tenant_id: String,
    pub site_id: String,
    pub query: String,
    /// Requested source types by name; `None` means every allowed type
    #[serde(default)]
    pub source_types: Option<Vec<String>>,
    /// Prior conversation turns, oldest first
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

impl RagRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        site_id: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            site_id: site_id.into(),
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_source_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagOutput {
    pub chunks: Vec<RetrievedChunk>,
    pub context_blocks: Vec<ContextBlock>,
    pub evidence: Vec<Evidence>,
    pub prompt: AssembledPrompt,
}

/// The assembled RAG core. Holds no per-request state.
#[derive(Debug, Clone)]
pub struct RagPipeline {
    retriever: Retriever,
    assembler: PromptAssembler,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, assembler: PromptAssembler) -> Self {
        Self {
            retriever,
            assembler,
        }
    }

    /// Probe the store for indexed search and build the pipeline around the
    /// matching strategy.
    pub async fn connect(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        assembler: PromptAssembler,
    ) -> AppResult<Self> {
        let strategy = select_strategy(store).await?;
        Ok(Self::new(Retriever::new(embedder, strategy), assembler))
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn run(&self, request: &RagRequest, policy: &RetrievalPolicy) -> AppResult<RagOutput> {
        let span = info_span!(
            "rag.pipeline",
            tenant_id = %request.tenant_id,
            site_id = %request.site_id
        );

        async move {
            policy.validate()?;
            let scope = validate_scope(
                &request.tenant_id,
                &request.site_id,
                request.source_types.as_deref(),
                &policy.guardrail,
            )?;
            // A broken template must fail before any provider is billed
            self.assembler.render_system()?;

            let chunks = self
                .retriever
                .retrieve(&scope, &request.query, policy)
                .await?;

            let context_blocks = ContextBuilder::new(policy.context.clone()).build(&chunks);
            let evidence = evidence_from_blocks(&context_blocks);
            let prompt = self
                .assembler
                .assemble(&context_blocks, &request.query, &request.history)?;

            debug!(
                chunks = chunks.len(),
                blocks = context_blocks.len(),
                "Pipeline complete"
            );

            Ok::<_, AppError>(RagOutput {
                chunks,
                context_blocks,
                evidence,
                prompt,
            })
        }
        .instrument(span)
        .await
    }
}
