//! PostgREST-style vector store adapter.
//!
//! Indexed search goes through a stored procedure exposed at
//! `/rest/v1/rpc/{match_function}`; the scan path reads the chunk table with
//! `eq.`/`in.` filters. Both paths send the tenant, site and source types so
//! the database applies them before anything leaves the server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use storechat_core::{AppError, AppResult, ProviderError, VectorStoreSettings};
use tracing::{debug, instrument, warn};

use super::{ChunkFilter, MatchRequest, StoreMatch, VectorStore};
use crate::http::{map_request_error, read_error_body};
use crate::types::{Chunk, SourceType};

const STORE_NAME: &str = "rest-store";

const REST_PATH: &str = "/rest/v1";

const DEFAULT_TABLE: &str = "chunks";

const DEFAULT_MATCH_FUNCTION: &str = "match_chunks";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Columns fetched by the scan path.
const SCAN_COLUMNS: &str = "id,tenant_id,site_id,entity_type,entity_id,version,chunk_index,\
content,content_hash,embedding,title,url,source_updated_at";

/// Vector store backed by a PostgREST endpoint over a pgvector table.
#[derive(Debug, Clone)]
pub struct RestVectorStore {
    client: Arc<Client>,
    base_url: String,
    api_key: Option<String>,
    table: String,
    match_function: String,
}

/// Parameters of the server-side match function.
#[derive(Debug, Serialize)]
struct MatchParams<'a> {
    query_embedding: &'a [f32],
    match_threshold: f32,
    match_count: usize,
    p_tenant_id: &'a str,
    p_site_id: &'a str,
    p_entity_types: Vec<&'static str>,
}

/// pgvector columns arrive either as JSON arrays or as `"[0.1,0.2]"` text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VectorColumn {
    Array(Vec<f32>),
    Text(String),
}

impl VectorColumn {
    fn into_vec(self) -> AppResult<Vec<f32>> {
        match self {
            Self::Array(values) => Ok(values),
            Self::Text(text) => parse_vector_literal(&text),
        }
    }
}

/// One row as returned by the table or the match function.
#[derive(Debug, Deserialize)]
struct ChunkRow {
    id: String,
    tenant_id: String,
    site_id: String,
    entity_type: String,
    entity_id: String,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    chunk_index: u32,
    content: String,
    #[serde(default)]
    content_hash: String,
    #[serde(default)]
    embedding: Option<VectorColumn>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    distance: Option<f32>,
}

impl ChunkRow {
    fn into_chunk(self) -> AppResult<(Chunk, Option<f32>)> {
        let source_type: SourceType = self.entity_type.parse()?;
        let embedding = match self.embedding {
            Some(column) => column.into_vec()?,
            None => Vec::new(),
        };

        let chunk = Chunk {
            id: self.id,
            tenant_id: self.tenant_id,
            site_id: self.site_id,
            source_type,
            source_id: self.entity_id,
            version: self.version,
            chunk_index: self.chunk_index,
            text: self.content,
            content_hash: self.content_hash,
            embedding,
            title: self.title,
            url: self.url,
            source_updated_at: self.source_updated_at,
        };
        Ok((chunk, self.distance))
    }
}

/// Parse a pgvector text literal such as `[0.1,0.2,0.3]`.
fn parse_vector_literal(text: &str) -> AppResult<Vec<f32>> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| malformed(format!("vector literal is not bracketed: {}", text)))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|value| {
            value
                .trim()
                .parse::<f32>()
                .map_err(|e| malformed(format!("bad vector component '{}': {}", value, e)))
        })
        .collect()
}

fn malformed(message: String) -> AppError {
    ProviderError::permanent(STORE_NAME, message).into()
}

fn entity_types(filter: &ChunkFilter) -> Vec<&'static str> {
    filter.source_types.iter().map(SourceType::as_str).collect()
}

/// Query string for the scan path.
fn scan_query(filter: &ChunkFilter) -> Vec<(&'static str, String)> {
    vec![
        ("select", SCAN_COLUMNS.to_string()),
        ("tenant_id", format!("eq.{}", filter.tenant_id)),
        ("site_id", format!("eq.{}", filter.site_id)),
        ("entity_type", format!("in.({})", entity_types(filter).join(","))),
        ("is_active", "eq.true".to_string()),
    ]
}

/// Whether the OpenAPI document exposes the given RPC.
fn exposes_function(openapi: &serde_json::Value, function: &str) -> bool {
    let path = format!("/rpc/{}", function);
    openapi
        .get("paths")
        .and_then(|paths| paths.as_object())
        .map(|paths| paths.contains_key(&path))
        .unwrap_or(false)
}

/// Convert rows, dropping any whose source type the crate does not model.
fn rows_to_chunks(rows: Vec<ChunkRow>) -> AppResult<Vec<(Chunk, Option<f32>)>> {
    let mut chunks = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id.clone();
        match row.into_chunk() {
            Ok(converted) => chunks.push(converted),
            Err(AppError::Validation(e)) => {
                warn!(chunk_id = %id, error = %e, "Skipping row with unknown source type");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(chunks)
}

impl RestVectorStore {
    pub fn new(settings: &VectorStoreSettings, api_key: Option<String>) -> AppResult<Self> {
        let base_url = settings
            .url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AppError::Config("vectorStore.url is not set".to_string()))?;

        let timeout = settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            base_url,
            api_key,
            table: settings
                .table
                .clone()
                .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            match_function: settings
                .match_function
                .clone()
                .unwrap_or_else(|| DEFAULT_MATCH_FUNCTION.to_string()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, REST_PATH, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> AppResult<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| map_request_error(STORE_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(ProviderError::from_status(STORE_NAME, status.as_u16(), &body).into());
        }

        response
            .json()
            .await
            .map_err(|e| map_request_error(STORE_NAME, e))
    }
}

#[async_trait::async_trait]
impl VectorStore for RestVectorStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    #[instrument(skip(self))]
    async fn supports_indexed_search(&self) -> AppResult<bool> {
        let openapi: serde_json::Value = self.send(self.client.get(self.url("/"))).await?;
        let available = exposes_function(&openapi, &self.match_function);
        debug!(function = %self.match_function, available, "Probed match function");
        Ok(available)
    }

    #[instrument(skip(self, request), fields(top_k = request.top_k))]
    async fn match_chunks(&self, request: &MatchRequest) -> AppResult<Vec<StoreMatch>> {
        let params = MatchParams {
            query_embedding: &request.query_vector,
            match_threshold: request.max_distance,
            match_count: request.top_k,
            p_tenant_id: &request.filter.tenant_id,
            p_site_id: &request.filter.site_id,
            p_entity_types: entity_types(&request.filter),
        };

        let url = self.url(&format!("/rpc/{}", self.match_function));
        let rows: Vec<ChunkRow> = self.send(self.client.post(url).json(&params)).await?;

        rows_to_chunks(rows)?
            .into_iter()
            .map(|(chunk, distance)| -> AppResult<StoreMatch> {
                let distance = distance.ok_or_else(|| {
                    malformed(format!("match row {} has no distance column", chunk.id))
                })?;
                Ok(StoreMatch { chunk, distance })
            })
            .collect()
    }

    #[instrument(skip(self, filter), fields(tenant_id = %filter.tenant_id, site_id = %filter.site_id))]
    async fn scan_chunks(&self, filter: &ChunkFilter) -> AppResult<Vec<Chunk>> {
        let url = self.url(&format!("/{}", self.table));
        let rows: Vec<ChunkRow> = self
            .send(self.client.get(url).query(&scan_query(filter)))
            .await?;

        Ok(rows_to_chunks(rows)?
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect())
    }
}
