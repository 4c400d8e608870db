pub mod compose;
pub mod config;
mod error;
pub mod merge;
mod meteo_sync;
pub mod query;
pub mod source;
pub mod store;
pub mod types;
mod utils;

pub use config::{SourceSettings, StoreSettings, SyncConfig};
pub use error::MeteoSyncError;
pub use meteo_sync::*;

pub use compose::composer::Composer;
pub use merge::{merge, MergeOutcome};
pub use query::facade::{MapRow, MetricBatch, MetricReader, MetricView};
pub use source::ckan_client::CkanClient;
pub use source::snapshot::{ObservationSource, SourceSnapshot};
pub use store::collection::{DocumentCollection, MemoryCollection};
pub use store::credentials::{CredentialChain, CredentialSource, Credentials};
pub use store::file_collection::FileCollection;
pub use store::firestore::FirestoreCollection;
pub use store::gateway::{DocumentStore, WriteMode, WriteReport};

pub use types::local_time::{LocalTimeNormalizer, NormalizedTime};
pub use types::metric_document::{MetricDocument, ScalarValue};
pub use types::observation::Observation;
pub use types::station::Station;

pub use compose::error::ComposeError;
pub use query::error::QueryError;
pub use source::error::SourceFetchError;
pub use store::credentials::CredentialError;
pub use store::error::{StoreError, ValidationError};

pub use utils::default_data_dir;
