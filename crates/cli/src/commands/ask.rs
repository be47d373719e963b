//! Ask command handler.
//!
//! Builds the retrieval policy from configuration and flags, connects the
//! pipeline to a local corpus or the configured vector store, and prints the
//! evidence and assembled prompt.

use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storechat_core::{config::AppConfig, AppError, AppResult};
use storechat_rag::{
    create_provider, ChatMessage, ContextBudget, EmbeddingProvider, Indexer, InMemoryVectorStore,
    PromptAssembler, RagOutput, RagPipeline, RagRequest, RestVectorStore, RetrievalPolicy,
    SourceTypeEnforcement, VectorStore,
};

use super::corpus::index_corpus;

/// Retrieve context for a shopper question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The shopper's question
    pub query: String,

    /// Tenant the request is scoped to
    #[arg(long, env = "STORECHAT_TENANT")]
    pub tenant: String,

    /// Site within the tenant
    #[arg(long, env = "STORECHAT_SITE")]
    pub site: String,

    /// Directory of source documents to index into an in-memory store
    #[arg(long, conflicts_with = "store_url")]
    pub corpus: Option<PathBuf>,

    /// Base URL of a PostgREST vector store (overrides vectorStore.url)
    #[arg(long)]
    pub store_url: Option<String>,

    /// Comma-separated source types to search (product, page, policy)
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<String>,

    /// JSON or YAML file with prior conversation turns
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Minimum similarity (0.0-1.0)
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Maximum chunks requested from the store
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Context budget in tokens
    #[arg(long, conflicts_with = "max_chars")]
    pub max_tokens: Option<usize>,

    /// Context budget in characters
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Store name used in the system prompt
    #[arg(long)]
    pub store_name: Option<String>,

    /// Drop disallowed source types instead of failing
    #[arg(long)]
    pub permissive: bool,

    /// Output the full result as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        config.validate()?;
        let policy = self.policy(config)?;

        let embedder = create_provider(&config.embedding, config.embedding_api_key())?;
        let store = self.open_store(config, embedder.clone(), &policy).await?;

        let assembler = PromptAssembler::default().with_variable(
            "storeName",
            self.store_name.clone().unwrap_or_else(|| self.site.clone()),
        );
        let pipeline = RagPipeline::connect(embedder, store, assembler).await?;

        let mut request = RagRequest::new(&self.tenant, &self.site, &self.query);
        if !self.types.is_empty() {
            request = request.with_source_types(self.types.iter().cloned());
        }
        if let Some(path) = &self.history {
            request = request.with_history(load_history(path)?);
        }

        let output = pipeline.run(&request, &policy).await?;
        self.print(&output)
    }

    /// Settings first, then flags.
    fn policy(&self, config: &AppConfig) -> AppResult<RetrievalPolicy> {
        let mut policy = RetrievalPolicy::from_settings(&config.retrieval)?;

        if config.retrieval.embedding_model.is_none() {
            policy = policy.with_embedding_model(config.embedding.model.clone());
        }
        if let Some(threshold) = self.threshold {
            policy = policy.with_similarity_threshold(threshold);
        }
        if let Some(top_k) = self.top_k {
            policy = policy.with_top_k(top_k);
        }
        if let Some(tokens) = self.max_tokens {
            policy = policy.with_budget(ContextBudget::Tokens(tokens));
        }
        if let Some(chars) = self.max_chars {
            policy = policy.with_budget(ContextBudget::Characters(chars));
        }
        if self.permissive {
            policy.guardrail.enforcement = SourceTypeEnforcement::Sanitize;
        }

        policy.validate()?;
        Ok(policy)
    }

    async fn open_store(
        &self,
        config: &AppConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        policy: &RetrievalPolicy,
    ) -> AppResult<Arc<dyn VectorStore>> {
        if let Some(corpus) = &self.corpus {
            let store = Arc::new(InMemoryVectorStore::new());
            let indexer = Indexer::new(embedder, store.clone(), policy.embedding_model.clone());
            index_corpus(corpus, &indexer).await?;
            return Ok(store);
        }

        let mut settings = config.vector_store.clone();
        if let Some(url) = &self.store_url {
            settings.url = Some(url.clone());
        }
        if settings.url.is_none() {
            return Err(AppError::Config(
                "No vector store configured. Pass --corpus DIR or --store-url URL, or set vectorStore.url"
                    .to_string(),
            ));
        }

        Ok(Arc::new(RestVectorStore::new(
            &settings,
            config.vector_store_api_key(),
        )?))
    }

    fn print(&self, output: &RagOutput) -> AppResult<()> {
        if self.json {
            let json = serde_json::to_string_pretty(output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
            return Ok(());
        }

        if output.evidence.is_empty() {
            println!("No relevant content found.");
        } else {
            println!("Evidence:");
            for (i, evidence) in output.evidence.iter().enumerate() {
                let title = evidence.title.as_deref().unwrap_or(&evidence.source_id);
                print!(
                    "  [{}] {} {} (score {:.3})",
                    i + 1,
                    evidence.source_type,
                    title,
                    evidence.score
                );
                match &evidence.url {
                    Some(url) => println!(" {}", url),
                    None => println!(),
                }
            }
        }

        println!();
        println!("{}", output.prompt.single_shot);
        Ok(())
    }
}

/// Load prior chat turns; the format follows the file extension.
fn load_history(path: &Path) -> AppResult<Vec<ChatMessage>> {
    let content = std::fs::read_to_string(path)?;
    let history = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };
    Ok(history)
}
