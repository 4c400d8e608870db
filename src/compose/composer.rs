//! Joins raw observation rows with the station and abbreviation dictionaries into
//! one [`MetricDocument`] per metric.

use crate::compose::error::ComposeError;
use crate::source::record::RawRecord;
use crate::source::snapshot::{ObservationSource, SourceSnapshot};
use crate::types::local_time::LocalTimeNormalizer;
use crate::types::metric_document::{MetricDocument, ScalarValue};
use crate::types::observation::Observation;
use crate::types::station::Station;
use chrono_tz::Tz;
use log::debug;
use std::collections::HashMap;

const FIELD_ABBREVIATION: &str = "ABBREVIATION";
const FIELD_STATION_ID: &str = "STATION_ID";
const FIELD_DATETIME: &str = "DATETIME";
const FIELD_VALUE: &str = "VALUE";

/// Builds metric documents from source data. Composition is a pure transformation;
/// only [`Composer::compose`] touches the network, through the given source.
#[derive(Debug, Clone, Copy, Default)]
pub struct Composer {
    normalizer: LocalTimeNormalizer,
}

impl Composer {
    /// A composer reading source timestamps as civil time in `tz`.
    pub fn new(tz: Tz) -> Self {
        Self {
            normalizer: LocalTimeNormalizer::new(tz),
        }
    }

    /// Fetches all three resources from `source` and composes `abbreviation`.
    pub async fn compose(
        &self,
        source: &dyn ObservationSource,
        abbreviation: &str,
    ) -> Result<MetricDocument, ComposeError> {
        let snapshot = SourceSnapshot::fetch(source).await?;
        self.compose_from(&snapshot, abbreviation)
    }

    /// Composes `abbreviation` from an already fetched snapshot.
    ///
    /// Returns [`ComposeError::NoData`] when no observation row carries the
    /// abbreviation. Unknown stations and unparseable values do not fail the
    /// composition; they leave the corresponding fields empty.
    pub fn compose_from(
        &self,
        snapshot: &SourceSnapshot,
        abbreviation: &str,
    ) -> Result<MetricDocument, ComposeError> {
        let stations = station_lookup(&snapshot.stations);

        let observations: Vec<Observation> = snapshot
            .observations
            .iter()
            .filter(|row| row.text(FIELD_ABBREVIATION) == abbreviation)
            .map(|row| self.observation_from(row, &stations))
            .collect();

        if observations.is_empty() {
            return Err(ComposeError::NoData(abbreviation.to_string()));
        }

        let mut document = MetricDocument::new(abbreviation);
        if let Some(meta) = abbreviation_meta(&snapshot.abbreviations, abbreviation) {
            apply_metadata(&mut document, meta);
        }
        document.observations = observations;
        document.refresh_total_stations();
        document.sort_observations();

        debug!(
            "Composed {}: {} observations from {} stations",
            abbreviation,
            document.observations.len(),
            document.total_stations
        );
        Ok(document)
    }

    fn observation_from(&self, row: &RawRecord, stations: &HashMap<String, Station>) -> Observation {
        let station_id = row.text(FIELD_STATION_ID);
        let time = self.normalizer.normalize(&row.text(FIELD_DATETIME));
        let mut observation = match stations.get(&station_id) {
            Some(station) => Observation {
                station_id: String::new(),
                station_name: station.name.clone(),
                wmo_id: station.wmo_id.clone(),
                begin_date: station.begin_date.clone(),
                latitude: station.latitude,
                longitude: station.longitude,
                gauss1: station.gauss1,
                gauss2: station.gauss2,
                geogr1: station.geogr1,
                geogr2: station.geogr2,
                elevation: station.elevation,
                elevation_pressure: station.elevation_pressure,
                ..Default::default()
            },
            None => Observation::default(),
        };
        observation.station_id = station_id;
        observation.datetime_epoch = time.epoch;
        observation.datetime_local = time.local_iso;
        observation.value = row.number(FIELD_VALUE);
        observation
    }
}

fn station_lookup(rows: &[RawRecord]) -> HashMap<String, Station> {
    rows.iter()
        .filter_map(Station::from_record)
        .map(|station| (station.id.clone(), station))
        .collect()
}

/// The dictionary row for `abbreviation`. The last matching row wins.
fn abbreviation_meta<'a>(rows: &'a [RawRecord], abbreviation: &str) -> Option<&'a RawRecord> {
    rows.iter()
        .rev()
        .find(|row| row.text(FIELD_ABBREVIATION) == abbreviation)
}

fn apply_metadata(document: &mut MetricDocument, meta: &RawRecord) {
    let text = |field: &str| Some(meta.text(field)).filter(|s| !s.is_empty());
    let scalar = |field: &str| meta.get(field).and_then(ScalarValue::from_json);

    document.en_description = text("EN_DESCRIPTION");
    document.lv_description = text("LV_DESCRIPTION");
    document.unit = text("MEASUREMENT_UNIT");
    document.scale = scalar("SCALE");
    document.lower_limit = scalar("LOWER_LIMIT");
    document.upper_limit = scalar("UPPER_LIMIT");
}
