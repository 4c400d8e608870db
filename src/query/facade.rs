//! Read side for map consumers: one document per metric, flattened into rows
//! that carry coordinates, timestamp, value, description and unit.

use crate::query::error::QueryError;
use crate::store::error::StoreError;
use crate::store::gateway::DocumentStore;
use crate::types::abbreviation::describe;
use crate::types::local_time::LocalTimeNormalizer;
use crate::types::metric_document::MetricDocument;
use bon::bon;
use chrono_tz::Tz;
use log::{debug, warn};
use polars::df;
use polars::prelude::*;
use std::collections::{BTreeMap, HashSet};

/// One observation as a map marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRow {
    pub abbreviation: String,
    pub station_id: String,
    pub station_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub datetime_epoch: i64,
    pub datetime_local: Option<String>,
    pub value: Option<f64>,
    pub description: String,
    pub unit: String,
}

/// A metric's rows plus the distinct timestamps they fall on.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricView {
    abbreviation: String,
    description: String,
    unit: String,
    rows: Vec<MapRow>,
    timestamps: Vec<i64>,
    normalizer: LocalTimeNormalizer,
}

impl MetricView {
    /// Flattens `document`. Rows without a station id or epoch are left out.
    pub fn from_document(document: &MetricDocument, normalizer: LocalTimeNormalizer) -> Self {
        let description = document
            .en_description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| describe(&document.abbreviation).map(str::to_string))
            .unwrap_or_else(|| document.abbreviation.clone());
        let unit = document.unit.clone().unwrap_or_default();

        let rows: Vec<MapRow> = document
            .observations
            .iter()
            .filter_map(|o| {
                let (station_id, epoch) = o.identity()?;
                Some(MapRow {
                    abbreviation: document.abbreviation.clone(),
                    station_id: station_id.to_string(),
                    station_name: o.station_name.clone(),
                    latitude: o.geogr2.or(o.latitude),
                    longitude: o.geogr1.or(o.longitude),
                    datetime_epoch: epoch,
                    datetime_local: o
                        .datetime_local
                        .clone()
                        .or_else(|| normalizer.epoch_to_local_iso(epoch)),
                    value: o.value,
                    description: description.clone(),
                    unit: unit.clone(),
                })
            })
            .collect();

        let mut timestamps: Vec<i64> = rows.iter().map(|r| r.datetime_epoch).collect();
        timestamps.sort_unstable();
        timestamps.dedup();

        Self {
            abbreviation: document.abbreviation.clone(),
            description,
            unit,
            rows,
            timestamps,
            normalizer,
        }
    }

    pub fn abbreviation(&self) -> &str {
        &self.abbreviation
    }

    /// English description. Without one in the document, the catalogue description
    /// of the metric, then the abbreviation itself.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn rows(&self) -> &[MapRow] {
        &self.rows
    }

    /// Distinct observation epochs, oldest first.
    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    /// [`MetricView::timestamps`] rendered in the civil timezone.
    pub fn local_timestamps(&self) -> Vec<String> {
        self.timestamps
            .iter()
            .filter_map(|&epoch| self.normalizer.epoch_to_local_iso(epoch))
            .collect()
    }

    /// Rows observed exactly at `epoch`.
    pub fn at_time(&self, epoch: i64) -> Vec<&MapRow> {
        self.rows
            .iter()
            .filter(|r| r.datetime_epoch == epoch)
            .collect()
    }

    /// Rows at the `index`-th distinct timestamp. An index past the end selects
    /// the newest timestamp; an empty view yields no rows.
    pub fn at_index(&self, index: usize) -> Vec<&MapRow> {
        let Some(last) = self.timestamps.len().checked_sub(1) else {
            return Vec::new();
        };
        self.at_time(self.timestamps[index.min(last)])
    }

    /// The rows as a polars frame, with a `datetime` column derived from the epoch.
    pub fn to_lazy_frame(&self) -> Result<LazyFrame, QueryError> {
        let frame = df!(
            "abbreviation" => self.rows.iter().map(|r| r.abbreviation.clone()).collect::<Vec<String>>(),
            "station_id" => self.rows.iter().map(|r| r.station_id.clone()).collect::<Vec<String>>(),
            "station_name" => self.rows.iter().map(|r| r.station_name.clone()).collect::<Vec<String>>(),
            "latitude" => self.rows.iter().map(|r| r.latitude).collect::<Vec<Option<f64>>>(),
            "longitude" => self.rows.iter().map(|r| r.longitude).collect::<Vec<Option<f64>>>(),
            "datetime_epoch" => self.rows.iter().map(|r| r.datetime_epoch).collect::<Vec<i64>>(),
            "datetime_local" => self.rows.iter().map(|r| r.datetime_local.clone()).collect::<Vec<Option<String>>>(),
            "value" => self.rows.iter().map(|r| r.value).collect::<Vec<Option<f64>>>(),
            "description" => self.rows.iter().map(|r| r.description.clone()).collect::<Vec<String>>(),
            "unit" => self.rows.iter().map(|r| r.unit.clone()).collect::<Vec<String>>(),
        )
        .map_err(|e| QueryError::Frame(self.abbreviation.clone(), e))?;

        Ok(frame.lazy().with_column(
            (col("datetime_epoch") * lit(1000i64))
                .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
                .alias("datetime"),
        ))
    }
}

/// Documents found by [`MetricReader::get_many`], plus the abbreviations with no
/// stored document.
#[derive(Debug, Clone, Default)]
pub struct MetricBatch {
    pub found: BTreeMap<String, MetricDocument>,
    pub missing: Vec<String>,
}

/// Borrowing read facade over a [`DocumentStore`].
pub struct MetricReader<'a> {
    store: &'a DocumentStore,
    allowed: Option<HashSet<String>>,
    normalizer: LocalTimeNormalizer,
}

#[bon]
impl<'a> MetricReader<'a> {
    /// `allowed` restricts which abbreviations may be read; `timezone` renders
    /// timestamps (defaults to Europe/Riga).
    #[builder]
    pub fn new(
        store: &'a DocumentStore,
        allowed: Option<Vec<String>>,
        timezone: Option<Tz>,
    ) -> Self {
        Self {
            store,
            allowed: allowed.map(|list| list.into_iter().collect()),
            normalizer: timezone.map(LocalTimeNormalizer::new).unwrap_or_default(),
        }
    }

    fn check_allowed(&self, abbreviation: &str) -> Result<(), QueryError> {
        match &self.allowed {
            Some(allowed) if !allowed.contains(abbreviation) => {
                warn!("Refusing to read '{}': not in the readable set", abbreviation);
                Err(QueryError::NotAllowed(abbreviation.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub async fn get(&self, abbreviation: &str) -> Result<MetricDocument, QueryError> {
        self.check_allowed(abbreviation)?;
        Ok(self.store.get(abbreviation).await?)
    }

    pub async fn view(&self, abbreviation: &str) -> Result<MetricView, QueryError> {
        let document = self.get(abbreviation).await?;
        Ok(MetricView::from_document(&document, self.normalizer))
    }

    /// Distinct timestamps of `abbreviation`, oldest first, in the civil timezone.
    pub async fn timestamps(&self, abbreviation: &str) -> Result<Vec<String>, QueryError> {
        Ok(self.view(abbreviation).await?.local_timestamps())
    }

    /// Reads several documents. Absent documents are listed in
    /// [`MetricBatch::missing`]; any other failure fails the call.
    pub async fn get_many<S: AsRef<str>>(&self, abbreviations: &[S]) -> Result<MetricBatch, QueryError> {
        for abbreviation in abbreviations {
            self.check_allowed(abbreviation.as_ref())?;
        }

        let mut batch = MetricBatch::default();
        for abbreviation in abbreviations {
            let abbreviation = abbreviation.as_ref();
            match self.store.get(abbreviation).await {
                Ok(document) => {
                    batch.found.insert(abbreviation.to_string(), document);
                }
                Err(StoreError::NotFound { .. }) => batch.missing.push(abbreviation.to_string()),
                Err(e) => return Err(e.into()),
            }
        }
        debug!(
            "Read {} documents, {} missing",
            batch.found.len(),
            batch.missing.len()
        );
        Ok(batch)
    }
}
