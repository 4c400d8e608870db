use crate::source::error::SourceFetchError;
use crate::source::record::RawRecord;
use async_trait::async_trait;
use log::info;

/// The three resources the composer needs. Each call returns the complete
/// resource or fails; pagination is the implementor's concern.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Rows of the abbreviation dictionary (metric descriptions, units, limits).
    async fn abbreviations(&self) -> Result<Vec<RawRecord>, SourceFetchError>;

    /// Rows of the station dictionary.
    async fn stations(&self) -> Result<Vec<RawRecord>, SourceFetchError>;

    /// Observation rows for every metric.
    async fn observations(&self) -> Result<Vec<RawRecord>, SourceFetchError>;
}

/// All three resources fetched once, so a sync pass can compose every
/// abbreviation from the same download.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSnapshot {
    pub abbreviations: Vec<RawRecord>,
    pub stations: Vec<RawRecord>,
    pub observations: Vec<RawRecord>,
}

impl SourceSnapshot {
    /// Downloads the dictionaries and the observations, one after the other.
    pub async fn fetch(source: &dyn ObservationSource) -> Result<Self, SourceFetchError> {
        let abbreviations = source.abbreviations().await?;
        let stations = source.stations().await?;
        let observations = source.observations().await?;
        info!(
            "Snapshot: {} abbreviations, {} stations, {} observation rows",
            abbreviations.len(),
            stations.len(),
            observations.len()
        );
        Ok(Self {
            abbreviations,
            stations,
            observations,
        })
    }
}

/// A snapshot can stand in for the live portal, which is how offline runs and
/// tests feed the composer.
#[async_trait]
impl ObservationSource for SourceSnapshot {
    async fn abbreviations(&self) -> Result<Vec<RawRecord>, SourceFetchError> {
        Ok(self.abbreviations.clone())
    }

    async fn stations(&self) -> Result<Vec<RawRecord>, SourceFetchError> {
        Ok(self.stations.clone())
    }

    async fn observations(&self) -> Result<Vec<RawRecord>, SourceFetchError> {
        Ok(self.observations.clone())
    }
}
