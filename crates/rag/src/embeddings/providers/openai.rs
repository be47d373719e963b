//! OpenAI-compatible embedding provider.
//!
//! Posts batches to `{endpoint}/v1/embeddings`. Works against the hosted API
//! and any gateway that speaks the same request shape.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use storechat_core::{AppError, AppResult, EmbeddingSettings, ProviderError};
use tracing::{debug, instrument};

use crate::embeddings::provider::{known_dimensions, EmbeddingProvider};
use crate::http::{map_request_error, read_error_body};

const EMBEDDING_PATH: &str = "/v1/embeddings";

const PROVIDER_NAME: &str = "openai";

/// Embedding provider backed by an OpenAI-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Arc<Client>,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    pub fn new(settings: &EmbeddingSettings, api_key: String) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.endpoint, EMBEDDING_PATH)
    }
}

/// Restore input order; the API tags each vector with its input index.
fn order_embeddings(response: EmbeddingResponse, expected: usize) -> AppResult<Vec<Vec<f32>>> {
    let mut data = response.data;
    data.sort_by_key(|d| d.index);

    if data.len() != expected || data.iter().enumerate().any(|(i, d)| d.index != i) {
        return Err(ProviderError::permanent(
            PROVIDER_NAME,
            format!(
                "expected {} embeddings, got {} with mismatched indices",
                expected,
                data.len()
            ),
        )
        .into());
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn dimensions(&self, model: &str) -> Option<usize> {
        known_dimensions(model)
    }

    #[instrument(skip(self, texts), fields(batch = texts.len()))]
    async fn embed_batch(&self, texts: &[String], model: &str) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model,
            input: texts,
            encoding_format: "float",
        };

        debug!("Sending embedding request to {}", self.url());

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(ProviderError::from_status(PROVIDER_NAME, status.as_u16(), &body).into());
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| map_request_error(PROVIDER_NAME, e))?;

        order_embeddings(parsed, texts.len())
    }
}
