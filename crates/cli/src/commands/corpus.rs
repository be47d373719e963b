//! Local corpus loading.
//!
//! A corpus is a directory of `.json` / `.yaml` files, each holding one
//! source document or a list of them.

use serde::Deserialize;
use std::path::Path;
use storechat_core::{AppError, AppResult};
use storechat_rag::{IndexOutcome, Indexer, SourceDocument};
use walkdir::WalkDir;

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentFile {
    Many(Vec<SourceDocument>),
    One(Box<SourceDocument>),
}

impl DocumentFile {
    fn into_documents(self) -> Vec<SourceDocument> {
        match self {
            Self::Many(documents) => documents,
            Self::One(document) => vec![*document],
        }
    }
}

fn is_document_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("yaml") | Some("yml")
    )
}

fn parse_file(path: &Path) -> AppResult<Vec<SourceDocument>> {
    let content = std::fs::read_to_string(path)?;
    let parsed: DocumentFile = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| {
            AppError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })?,
        _ => serde_yaml::from_str(&content).map_err(|e| {
            AppError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })?,
    };
    Ok(parsed.into_documents())
}

/// Read every source document under `dir`, in path order.
pub fn load_documents(dir: &Path) -> AppResult<Vec<SourceDocument>> {
    if !dir.is_dir() {
        return Err(AppError::Config(format!(
            "Corpus directory does not exist: {}",
            dir.display()
        )));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && is_document_file(path) {
            let parsed = parse_file(path)?;
            tracing::debug!("Loaded {} documents from {:?}", parsed.len(), path);
            documents.extend(parsed);
        }
    }

    Ok(documents)
}

/// Index every document under `dir`. Returns the number of chunks written.
pub async fn index_corpus(dir: &Path, indexer: &Indexer) -> AppResult<usize> {
    let documents = load_documents(dir)?;
    let mut chunks = 0;

    for document in &documents {
        if let IndexOutcome::Indexed { chunks: written, .. } = indexer.index_document(document).await? {
            chunks += written;
        }
    }

    tracing::info!(
        "Indexed {} documents ({} chunks) from {:?}",
        documents.len(),
        chunks,
        dir
    );
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use storechat_rag::{InMemoryVectorStore, MockProvider, SourceType};
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_load_single_and_list_files() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "a.json",
            r#"{"tenantId":"t1","siteId":"s1","sourceType":"product","sourceId":"p1","content":"Tent"}"#,
        );
        write(
            temp.path(),
            "b.yaml",
            "- tenantId: t1\n  siteId: s1\n  sourceType: policy\n  sourceId: returns\n  content: 30 days\n\
             - tenantId: t1\n  siteId: s1\n  sourceType: page\n  sourceId: about\n  content: About us\n",
        );
        write(temp.path(), "notes.txt", "ignored");

        let documents = load_documents(temp.path()).unwrap();
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[0].source_type, SourceType::Product);
        assert_eq!(documents[1].source_id, "returns");
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "broken.json", r#"{"tenantId": "t1"}"#);

        assert!(matches!(
            load_documents(temp.path()),
            Err(AppError::Serialization(_))
        ));
    }

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        assert!(load_documents(&temp.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn test_index_corpus_into_memory_store() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "catalog.yaml",
            "- tenantId: t1\n  siteId: s1\n  sourceType: product\n  sourceId: p1\n  content: Ultralight tent\n\
             - tenantId: t1\n  siteId: s1\n  sourceType: product\n  sourceId: p2\n  content: Down sleeping bag\n",
        );

        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = Indexer::new(Arc::new(MockProvider::new(8)), store.clone(), "mock");

        assert_eq!(index_corpus(temp.path(), &indexer).await.unwrap(), 2);
        assert_eq!(store.active_len().unwrap(), 2);
    }
}
