//! Configuration management for storechat.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (.storechat/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! Later sources win. Retrieval settings are kept as plain values here; the
//! RAG crate turns them into a typed, validated policy per call.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Default embedding model for query and chunk vectors.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Config file name inside the `.storechat` directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .storechat/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    pub embedding: EmbeddingSettings,

    pub vector_store: VectorStoreSettings,

    pub retrieval: RetrievalSettings,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit JSON log lines
    pub json_logs: bool,
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// Provider name: "openai" or "mock"
    pub provider: String,

    pub model: String,

    /// API base URL (without the `/v1/...` path)
    pub endpoint: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            endpoint: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Remote vector store settings (PostgREST-style API).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectorStoreSettings {
    /// Base URL; `None` means no remote store is configured
    pub url: Option<String>,

    pub api_key_env: Option<String>,

    /// Chunk table name
    pub table: Option<String>,

    /// Server-side similarity search function
    pub match_function: Option<String>,

    pub timeout_secs: Option<u64>,
}

/// Per-site retrieval limits as supplied by the settings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalSettings {
    pub similarity_threshold: f32,

    pub top_k: usize,

    /// Allowed source type names (e.g. "product", "page", "policy")
    pub allowed_source_types: Vec<String>,

    /// "strict" rejects disallowed types, "sanitize" drops them
    pub source_type_enforcement: String,

    /// Token budget; ignored when `max_characters` is set
    pub max_tokens: Option<usize>,

    pub max_characters: Option<usize>,

    pub max_sources: usize,

    pub max_chunks_per_source: usize,

    /// "concatenate" or "separate"
    pub merge_strategy: String,

    pub embedding_model: Option<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            top_k: 10,
            allowed_source_types: vec![
                "product".to_string(),
                "page".to_string(),
                "policy".to_string(),
            ],
            source_type_enforcement: "strict".to_string(),
            max_tokens: Some(4000),
            max_characters: None,
            max_sources: 5,
            max_chunks_per_source: 3,
            merge_strategy: "concatenate".to_string(),
            embedding_model: None,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    embedding: Option<EmbeddingSettings>,
    vector_store: Option<VectorStoreSettings>,
    retrieval: Option<RetrievalSettings>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            embedding: EmbeddingSettings::default(),
            vector_store: VectorStoreSettings::default(),
            retrieval: RetrievalSettings::default(),
            log_level: None,
            verbose: false,
            no_color: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and environment variables.
    ///
    /// Environment variables:
    /// - `STORECHAT_WORKSPACE`: Override workspace path
    /// - `STORECHAT_CONFIG`: Path to config file
    /// - `STORECHAT_EMBEDDING_PROVIDER`: Embedding provider
    /// - `STORECHAT_EMBEDDING_MODEL`: Embedding model
    /// - `STORECHAT_STORE_URL`: Vector store base URL
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use storechat_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("STORECHAT_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("STORECHAT_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.storechat_dir().join(CONFIG_FILE_NAME));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env();

        Ok(config)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("STORECHAT_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Ok(model) = std::env::var("STORECHAT_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        if let Ok(url) = std::env::var("STORECHAT_STORE_URL") {
            self.vector_store.url = Some(url);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.json_logs = json;
            }
        }

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }

        if let Some(store) = config_file.vector_store {
            result.vector_store = store;
        }

        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> AppResult<Self> {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            if config_file.exists() {
                self = self.merge_yaml(&config_file)?;
            }
            self.config_file = Some(config_file);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        Ok(self)
    }

    /// Get the path to the .storechat directory.
    pub fn storechat_dir(&self) -> PathBuf {
        self.workspace.join(".storechat")
    }

    /// Resolve the embedding API key from its environment variable.
    pub fn embedding_api_key(&self) -> Option<String> {
        std::env::var(&self.embedding.api_key_env).ok()
    }

    /// Resolve the vector store API key from its environment variable.
    pub fn vector_store_api_key(&self) -> Option<String> {
        self.vector_store
            .api_key_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    /// Validate configuration for the active embedding provider.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["openai", "mock"];
        let provider = self.embedding.provider.as_str();

        if !known_providers.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                provider,
                known_providers.join(", ")
            )));
        }

        if provider == "openai" && self.embedding_api_key().is_none() {
            return Err(AppError::Config(format!(
                "API key not found in environment variable: {}",
                self.embedding.api_key_env
            )));
        }

        if self.retrieval.max_tokens.is_none() && self.retrieval.max_characters.is_none() {
            return Err(AppError::Config(
                "retrieval needs either maxTokens or maxCharacters".to_string(),
            ));
        }

        Ok(())
    }
}
