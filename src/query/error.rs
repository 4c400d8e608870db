use crate::store::error::StoreError;
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Abbreviation '{0}' is not in the readable set")]
    NotAllowed(String),

    #[error("Failed to build frame for '{0}'")]
    Frame(String, #[source] PolarsError),
}
