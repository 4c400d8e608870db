use crate::source::error::SourceFetchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    SourceFetch(#[from] SourceFetchError),

    #[error("No observations found for abbreviation '{0}'")]
    NoData(String),
}
