use crate::store::credentials::CredentialError;
use std::path::PathBuf;
use thiserror::Error;

/// A payload rejected before any backend call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Document abbreviation is empty")]
    EmptyAbbreviation,

    #[error("Document abbreviation '{found}' does not match key '{key}'")]
    KeyMismatch { key: String, found: String },

    #[error("'{0}' cannot be used as a document key")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document '{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Failed to decode document '{id}'")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode document '{id}'")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error at '{0}'")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to replace '{0}'")]
    Persist(PathBuf, #[source] tempfile::PersistError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response from {url}: {message}")]
    Backend { url: String, message: String },
}
