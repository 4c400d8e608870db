//! Read, write and export operations against the keyed metric collection.

use crate::config::StoreSettings;
use crate::merge::engine::{admit_all, merge, MergeOutcome};
use crate::store::collection::{check_document_id, DocumentCollection, RawDocument};
use crate::store::error::{StoreError, ValidationError};
use crate::store::file_collection::write_atomically;
use crate::store::key_order::{reorder_top_level, to_ordered_map};
use crate::types::metric_document::MetricDocument;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// How `put` combines the new document with what is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Overwrite the stored document.
    Replace,
    /// Merge into the stored document: dedup, append, prune.
    #[default]
    Incremental,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Replace => f.pad("replace"),
            WriteMode::Incremental => f.pad("incremental"),
        }
    }
}

/// What a single `put` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub abbreviation: String,
    pub mode: WriteMode,
    /// Incoming observations that made it into the document.
    pub admitted: usize,
    /// Incoming observations dropped as invalid, duplicate or stale.
    pub skipped: usize,
    /// Observations dropped by the retention window.
    pub pruned: usize,
    /// Observations in the written document.
    pub retained: usize,
    pub total_stations: usize,
    pub estimated_bytes: usize,
    pub size_warning: bool,
}

/// Gateway over one document collection.
///
/// Documents are validated and merged here before they reach the backend; the
/// backend only ever sees whole, key-ordered documents.
pub struct DocumentStore {
    collection: Box<dyn DocumentCollection>,
    settings: StoreSettings,
}

impl DocumentStore {
    pub fn new(collection: impl DocumentCollection + 'static, settings: StoreSettings) -> Self {
        Self::from_boxed(Box::new(collection), settings)
    }

    pub fn from_boxed(collection: Box<dyn DocumentCollection>, settings: StoreSettings) -> Self {
        Self {
            collection,
            settings,
        }
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Writes `document` under `abbreviation`.
    ///
    /// In [`WriteMode::Incremental`] the stored document (if any) is read first and
    /// the two are merged; otherwise the document is cleaned and written as is. A
    /// document at or above the size threshold is still written, with a warning.
    /// Backend failures are returned, not retried.
    pub async fn put(
        &self,
        abbreviation: &str,
        document: MetricDocument,
        mode: WriteMode,
    ) -> Result<WriteReport, StoreError> {
        validate(abbreviation, &document)?;

        let window = self.settings.prune_window_for(abbreviation);
        let outcome = match mode {
            WriteMode::Replace => admit_all(document),
            WriteMode::Incremental => {
                let existing = self.try_get(abbreviation).await?;
                merge(existing, document, window)
            }
        };
        let MergeOutcome {
            document,
            admitted,
            skipped,
            pruned,
        } = outcome;

        let payload = to_ordered_map(&document).map_err(|e| StoreError::Encode {
            id: abbreviation.to_string(),
            source: e,
        })?;
        let estimated_bytes = estimate_size(&payload);
        let size_warning = estimated_bytes >= self.settings.size_warn_bytes;
        if size_warning {
            warn!(
                "{}/{} is ~{} bytes, at or above the {} byte budget",
                self.collection_name(),
                abbreviation,
                estimated_bytes,
                self.settings.size_warn_bytes
            );
        }

        if let Err(e) = self.collection.set(abbreviation, &payload).await {
            error!(
                "Writing {}/{} failed: {}",
                self.collection_name(),
                abbreviation,
                e
            );
            return Err(e);
        }

        let retained = document.observations.len();
        match mode {
            WriteMode::Replace => info!(
                "replace {}/{} (OBS={})",
                self.collection_name(),
                abbreviation,
                retained
            ),
            WriteMode::Incremental => info!(
                "incremental {}/{}: added {} new, kept {} after {}h prune",
                self.collection_name(),
                abbreviation,
                admitted,
                retained,
                window.as_secs() / 3600
            ),
        }

        Ok(WriteReport {
            abbreviation: abbreviation.to_string(),
            mode,
            admitted,
            skipped,
            pruned,
            retained,
            total_stations: document.total_stations,
            estimated_bytes,
            size_warning,
        })
    }

    /// The document stored under `abbreviation`.
    pub async fn get(&self, abbreviation: &str) -> Result<MetricDocument, StoreError> {
        self.try_get(abbreviation)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection: self.collection_name().to_string(),
                id: abbreviation.to_string(),
            })
    }

    /// Like [`DocumentStore::get`], but an absent document is `Ok(None)`.
    pub async fn try_get(&self, abbreviation: &str) -> Result<Option<MetricDocument>, StoreError> {
        check_document_id(abbreviation)?;
        match self.collection.get(abbreviation).await? {
            Some(raw) => decode(abbreviation, raw).map(Some),
            None => Ok(None),
        }
    }

    /// Every document in the collection, keyed by abbreviation.
    pub async fn export_all(&self) -> Result<BTreeMap<String, MetricDocument>, StoreError> {
        let documents = self.collection.list().await?;
        debug!(
            "Exporting {} documents from {}",
            documents.len(),
            self.collection_name()
        );
        documents
            .into_iter()
            .map(|(id, raw)| decode(&id, raw).map(|doc| (id, doc)))
            .collect()
    }

    /// Writes the document for `abbreviation` to `<folder>/<abbreviation>.json`.
    pub async fn save_json(&self, abbreviation: &str, folder: &Path) -> Result<PathBuf, StoreError> {
        let document = self.get(abbreviation).await?;
        let payload = to_ordered_map(&document).map_err(|e| StoreError::Encode {
            id: abbreviation.to_string(),
            source: e,
        })?;
        let bytes = serde_json::to_vec_pretty(&payload).map_err(|e| StoreError::Encode {
            id: abbreviation.to_string(),
            source: e,
        })?;
        let path = folder.join(format!("{}.json", abbreviation));
        write_atomically(path.clone(), bytes).await?;
        info!("Saved {} to {}", abbreviation, path.display());
        Ok(path)
    }

    /// Writes the whole collection to `path` as one JSON object keyed by
    /// abbreviation. Returns the number of documents written.
    pub async fn export_to_file(&self, path: &Path) -> Result<usize, StoreError> {
        let documents = self.export_all().await?;
        let mut export = serde_json::Map::new();
        for (id, document) in &documents {
            let payload = to_ordered_map(document).map_err(|e| StoreError::Encode {
                id: id.clone(),
                source: e,
            })?;
            export.insert(id.clone(), Value::Object(payload));
        }
        let bytes = serde_json::to_vec_pretty(&export).map_err(|e| StoreError::Encode {
            id: self.collection_name().to_string(),
            source: e,
        })?;
        write_atomically(path.to_path_buf(), bytes).await?;
        info!(
            "Exported {} documents from {} to {}",
            documents.len(),
            self.collection_name(),
            path.display()
        );
        Ok(documents.len())
    }
}

fn validate(abbreviation: &str, document: &MetricDocument) -> Result<(), ValidationError> {
    if abbreviation.trim().is_empty() || document.abbreviation.trim().is_empty() {
        return Err(ValidationError::EmptyAbbreviation);
    }
    if document.abbreviation != abbreviation {
        return Err(ValidationError::KeyMismatch {
            key: abbreviation.to_string(),
            found: document.abbreviation.clone(),
        });
    }
    check_document_id(abbreviation)
}

/// Decodes a stored document. A document without `ABBREVIATION` takes its key.
fn decode(id: &str, mut raw: RawDocument) -> Result<MetricDocument, StoreError> {
    raw.entry("ABBREVIATION")
        .or_insert_with(|| Value::String(id.to_string()));
    serde_json::from_value(Value::Object(reorder_top_level(raw))).map_err(|e| StoreError::Decode {
        id: id.to_string(),
        source: e,
    })
}

/// Size of the compact JSON encoding, close to what the hosted store counts.
fn estimate_size(payload: &RawDocument) -> usize {
    serde_json::to_vec(payload).map(|bytes| bytes.len()).unwrap_or(usize::MAX)
}
