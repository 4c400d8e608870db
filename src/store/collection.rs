//! The keyed document collection behind the gateway.

use crate::store::error::{StoreError, ValidationError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// A stored document: one JSON object, written and read whole.
pub type RawDocument = Map<String, Value>;

/// A collection of JSON documents keyed by string ID.
///
/// Writes replace the whole document. A concurrent reader sees either the
/// previous or the new document, never a mix.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Collection name, used in log lines and errors.
    fn name(&self) -> &str;

    /// The document stored under `id`, or `None` when absent.
    async fn get(&self, id: &str) -> Result<Option<RawDocument>, StoreError>;

    /// Replaces (or creates) the document stored under `id`.
    async fn set(&self, id: &str, document: &RawDocument) -> Result<(), StoreError>;

    /// Every document in the collection, ordered by ID.
    async fn list(&self) -> Result<Vec<(String, RawDocument)>, StoreError>;
}

/// Rejects IDs that cannot double as a file name or a REST path segment.
pub fn check_document_id(id: &str) -> Result<(), ValidationError> {
    let trimmed = id.trim();
    if trimmed.is_empty()
        || trimmed != id
        || id.starts_with('.')
        || id.contains(['/', '\\'])
    {
        return Err(ValidationError::InvalidKey(id.to_string()));
    }
    Ok(())
}

/// In-process collection for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<BTreeMap<String, RawDocument>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// A collection pre-filled with `documents`.
    pub fn with_documents(
        name: impl Into<String>,
        documents: impl IntoIterator<Item = (String, RawDocument)>,
    ) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(documents.into_iter().collect()),
        }
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, id: &str) -> Result<Option<RawDocument>, StoreError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn set(&self, id: &str, document: &RawDocument) -> Result<(), StoreError> {
        check_document_id(id)?;
        self.documents
            .write()
            .await
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, RawDocument)>, StoreError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect())
    }
}
