use crate::compose::error::ComposeError;
use crate::query::error::QueryError;
use crate::source::error::SourceFetchError;
use crate::store::credentials::CredentialError;
use crate::store::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeteoSyncError {
    #[error(transparent)]
    SourceFetch(#[from] SourceFetchError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Failed to determine data directory")]
    DataDirResolution(#[source] std::io::Error),

    #[error("A project id is required for the '{0}' store")]
    MissingProject(String),
}
