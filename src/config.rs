//! Code-first configuration for the source client, the store gateway and a sync
//! pass. Every setting has a default matching the production deployment, so
//! `SyncConfig::default()` is a working configuration.

use crate::types::abbreviation::operational_abbreviations;
use crate::types::local_time::DEFAULT_TIMEZONE;
use bon::Builder;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::time::Duration;

/// `datastore_search` endpoint of the Latvian open-data portal.
pub const DEFAULT_DATASTORE_URL: &str = "https://data.gov.lv/dati/lv/api/action/datastore_search";
/// Observation readings (many rows).
pub const RESOURCE_OBSERVATIONS: &str = "17460efb-ae99-4d1d-8144-1068f184b05f";
/// Abbreviation dictionary (at most ~50 rows).
pub const RESOURCE_ABBREVIATIONS: &str = "38b462ac-08b9-4168-9d6e-cbaedc2e775d";
/// Station dictionary (at most ~300 rows).
pub const RESOURCE_STATIONS: &str = "c32c7afd-0d05-44fd-8b24-1de85b4bf11d";

pub const DEFAULT_COLLECTION: &str = "meteorological_operational_data";
/// Leaves headroom under the 1 MiB per-document ceiling of the hosted store.
pub const DEFAULT_SIZE_WARN_BYTES: usize = 900_000;
pub const DEFAULT_PRUNE_WINDOW: Duration = Duration::from_secs(48 * 3600);

/// Where and how to download the three CKAN resources.
#[derive(Debug, Clone, Builder)]
pub struct SourceSettings {
    #[builder(default = DEFAULT_DATASTORE_URL.to_string(), into)]
    pub base_url: String,
    #[builder(default = RESOURCE_OBSERVATIONS.to_string(), into)]
    pub observations_resource: String,
    #[builder(default = RESOURCE_ABBREVIATIONS.to_string(), into)]
    pub abbreviations_resource: String,
    #[builder(default = RESOURCE_STATIONS.to_string(), into)]
    pub stations_resource: String,
    /// Page size for observation rows; capped at the datastore maximum.
    #[builder(default = 10_000)]
    pub observation_batch: usize,
    #[builder(default = 50)]
    pub abbreviation_batch: usize,
    #[builder(default = 300)]
    pub station_batch: usize,
    #[builder(default = Duration::from_secs(60))]
    pub request_timeout: Duration,
    /// Civil timezone of the published timestamps.
    #[builder(default = DEFAULT_TIMEZONE)]
    pub timezone: Tz,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Gateway settings: size budget and retention.
#[derive(Debug, Clone, Builder)]
pub struct StoreSettings {
    #[builder(default = DEFAULT_SIZE_WARN_BYTES)]
    pub size_warn_bytes: usize,
    /// Retention horizon applied to every document without an override.
    #[builder(default = DEFAULT_PRUNE_WINDOW)]
    pub prune_window: Duration,
    /// Per-abbreviation retention horizons.
    #[builder(default)]
    pub prune_overrides: HashMap<String, Duration>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl StoreSettings {
    /// The retention horizon for `abbreviation`.
    pub fn prune_window_for(&self, abbreviation: &str) -> Duration {
        self.prune_overrides
            .get(abbreviation)
            .copied()
            .unwrap_or(self.prune_window)
    }
}

/// Everything a sync pass needs besides the store handle itself.
#[derive(Debug, Clone, Builder)]
pub struct SyncConfig {
    #[builder(default)]
    pub source: SourceSettings,
    #[builder(default)]
    pub store: StoreSettings,
    /// Abbreviations synchronised by a pass, in order.
    #[builder(default = operational_abbreviations())]
    pub abbreviations: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
