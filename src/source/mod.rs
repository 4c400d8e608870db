pub mod ckan_client;
pub mod error;
pub mod record;
pub mod snapshot;
