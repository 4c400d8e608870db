use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceFetchError {
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

    #[error("Invalid JSON payload for resource {resource}")]
    InvalidPayload {
        resource: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("CKAN returned an unsuccessful response for resource {0}")]
    Unsuccessful(String),

    #[error("No records received for resource {0}")]
    NoRecords(String),
}
