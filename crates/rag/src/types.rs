//! Core data model for retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use storechat_core::ValidationError;

/// Kind of store content a chunk was cut from.
///
/// The member set is closed: anything the ingestion side reports outside of
/// it cannot be represented, so allowlists are sets over this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Product,
    Page,
    Policy,
}

impl SourceType {
    /// Every known source type, in canonical order.
    pub const ALL: [SourceType; 3] = [SourceType::Product, SourceType::Page, SourceType::Policy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Page => "page",
            Self::Policy => "policy",
        }
    }

    /// Human-readable label used in prompt section headers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Product => "Product",
            Self::Page => "Page",
            Self::Policy => "Policy",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "product" => Ok(Self::Product),
            "page" => Ok(Self::Page),
            "policy" => Ok(Self::Policy),
            _ => Err(ValidationError::UnknownSourceType(s.to_string())),
        }
    }
}

/// Identity of one source document within a tenant's site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceKey {
    pub tenant_id: String,
    pub site_id: String,
    pub source_type: SourceType,
    pub source_id: String,
}

/// One embedded slice of a source document.
///
/// `(tenant_id, site_id, source_type, source_id, version)` addresses the
/// source generation the chunk belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Unique chunk identifier
    pub id: String,

    pub tenant_id: String,

    pub site_id: String,

    pub source_type: SourceType,

    /// Entity id of the source document (product id, page id, ...)
    pub source_id: String,

    /// Source generation; only the highest version per source is served
    pub version: u32,

    /// Position within the source
    pub chunk_index: u32,

    pub text: String,

    /// SHA-256 of the chunk text, used for dedup
    pub content_hash: String,

    /// Embedding vector; dropped once retrieval has scored the chunk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_updated_at: Option<DateTime<Utc>>,
}

impl Chunk {
    pub fn source_key(&self) -> SourceKey {
        SourceKey {
            tenant_id: self.tenant_id.clone(),
            site_id: self.site_id.clone(),
            source_type: self.source_type,
            source_id: self.source_id.clone(),
        }
    }

    /// Whether the chunk belongs to the given tenant and site.
    pub fn is_owned_by(&self, tenant_id: &str, site_id: &str) -> bool {
        self.tenant_id == tenant_id && self.site_id == site_id
    }
}

/// A chunk scored against one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub chunk: Chunk,

    /// Similarity in [0, 1], higher is better
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_parsing() {
        assert_eq!("product".parse::<SourceType>().unwrap(), SourceType::Product);
        assert_eq!(" Page ".parse::<SourceType>().unwrap(), SourceType::Page);
        assert_eq!("POLICY".parse::<SourceType>().unwrap(), SourceType::Policy);
        assert_eq!(
            "faq".parse::<SourceType>(),
            Err(ValidationError::UnknownSourceType("faq".to_string()))
        );
    }

    #[test]
    fn test_source_type_serde_names() {
        let json = serde_json::to_string(&SourceType::Product).unwrap();
        assert_eq!(json, "\"product\"");

        let parsed: SourceType = serde_json::from_str("\"policy\"").unwrap();
        assert_eq!(parsed, SourceType::Policy);
        assert!(serde_json::from_str::<SourceType>("\"faq\"").is_err());
    }

    #[test]
    fn test_chunk_serialization_skips_empty_embedding() {
        let chunk = Chunk {
            id: "c1".to_string(),
            tenant_id: "t1".to_string(),
            site_id: "s1".to_string(),
            source_type: SourceType::Product,
            source_id: "42".to_string(),
            version: 1,
            chunk_index: 0,
            text: "Wireless headphones".to_string(),
            content_hash: "abc".to_string(),
            embedding: Vec::new(),
            title: None,
            url: None,
            source_updated_at: None,
        };

        let value = serde_json::to_value(&chunk).unwrap();
        assert!(value.get("embedding").is_none());
        assert_eq!(value["sourceType"], "product");
        assert_eq!(value["chunkIndex"], 0);
        assert!(chunk.is_owned_by("t1", "s1"));
        assert!(!chunk.is_owned_by("t2", "s1"));
    }
}
