//! Defines [`MetricDocument`], the unit of storage: one document per metric
//! abbreviation, holding the metric's metadata and its rolling window of
//! station observations.

use crate::types::observation::Observation;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// A metadata value from the abbreviation dictionary. The portal publishes
/// scales and limits as integers, floats or free text depending on the metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// Converts a raw JSON value from the source into a scalar. Null and empty
    /// strings are treated as absent.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(ScalarValue::Integer)
                .or_else(|| n.as_f64().map(ScalarValue::Float)),
            Value::String(s) if !s.trim().is_empty() => Some(ScalarValue::Text(s.clone())),
            Value::Bool(b) => Some(ScalarValue::Text(b.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Integer(i) => write!(f, "{}", i),
            ScalarValue::Float(x) => write!(f, "{}", x),
            ScalarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// All stored observations for one metric, plus the metric's dictionary metadata.
///
/// Field declaration order matches the presentation order used for exports:
/// case-insensitive alphabetical with `OBSERVATIONS` last. Keys the crate does not
/// know about are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricDocument {
    #[serde(rename = "ABBREVIATION")]
    pub abbreviation: String,
    #[serde(rename = "EN_DESCRIPTION", default)]
    pub en_description: Option<String>,
    #[serde(rename = "LOWER_LIMIT", default)]
    pub lower_limit: Option<ScalarValue>,
    #[serde(rename = "LV_DESCRIPTION", default)]
    pub lv_description: Option<String>,
    #[serde(rename = "MEASUREMENT_UNIT", default)]
    pub unit: Option<String>,
    #[serde(rename = "SCALE", default)]
    pub scale: Option<ScalarValue>,
    /// Number of distinct non-empty station ids among `observations`.
    #[serde(rename = "TOTAL_STATIONS", default)]
    pub total_stations: usize,
    #[serde(rename = "UPPER_LIMIT", default)]
    pub upper_limit: Option<ScalarValue>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(rename = "OBSERVATIONS", default)]
    pub observations: Vec<Observation>,
}

impl MetricDocument {
    /// Creates an empty document for `abbreviation` with no metadata.
    pub fn new(abbreviation: impl Into<String>) -> Self {
        Self {
            abbreviation: abbreviation.into(),
            ..Default::default()
        }
    }

    /// Recomputes `total_stations` from the current observations.
    pub fn refresh_total_stations(&mut self) {
        self.total_stations = count_stations(&self.observations);
    }

    /// Sorts observations by station name descending, then epoch descending.
    /// Missing epochs sort last; the sort is stable, so ties keep their order.
    pub fn sort_observations(&mut self) {
        sort_observations(&mut self.observations);
    }

    /// Copies every metadata field that `incoming` carries onto `self`.
    /// Fields absent in `incoming` keep their current value; the abbreviation
    /// never changes.
    pub fn overwrite_metadata(&mut self, incoming: &MetricDocument) {
        fn take<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
            if source.is_some() {
                target.clone_from(source);
            }
        }
        take(&mut self.en_description, &incoming.en_description);
        take(&mut self.lv_description, &incoming.lv_description);
        take(&mut self.scale, &incoming.scale);
        take(&mut self.lower_limit, &incoming.lower_limit);
        take(&mut self.upper_limit, &incoming.upper_limit);
        take(&mut self.unit, &incoming.unit);
    }

    /// Distinct observation epochs, oldest first.
    pub fn distinct_epochs(&self) -> Vec<i64> {
        let mut epochs: Vec<i64> = self
            .observations
            .iter()
            .filter_map(|o| o.datetime_epoch)
            .collect();
        epochs.sort_unstable();
        epochs.dedup();
        epochs
    }
}

/// Number of distinct non-empty station ids in `observations`.
pub fn count_stations(observations: &[Observation]) -> usize {
    observations
        .iter()
        .filter_map(Observation::station_key)
        .collect::<HashSet<_>>()
        .len()
}

/// Orders two observations for storage: name descending, then epoch descending.
pub fn storage_order(a: &Observation, b: &Observation) -> Ordering {
    // Option<i64> orders None below every Some, so a missing epoch is the minimum.
    (&b.station_name, b.datetime_epoch).cmp(&(&a.station_name, a.datetime_epoch))
}

pub fn sort_observations(observations: &mut [Observation]) {
    observations.sort_by(storage_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obs(id: &str, name: &str, epoch: Option<i64>) -> Observation {
        Observation {
            station_id: id.to_string(),
            station_name: name.to_string(),
            datetime_epoch: epoch,
            ..Default::default()
        }
    }

    #[test]
    fn test_sort_name_then_epoch_descending() {
        let mut doc = MetricDocument::new("HTDRY");
        doc.observations = vec![
            obs("a", "Ainaži", Some(10)),
            obs("z", "Zosēni", None),
            obs("z", "Zosēni", Some(5)),
            obs("a", "Ainaži", Some(30)),
            obs("z", "Zosēni", Some(50)),
        ];
        doc.sort_observations();

        let order: Vec<(&str, Option<i64>)> = doc
            .observations
            .iter()
            .map(|o| (o.station_name.as_str(), o.datetime_epoch))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Zosēni", Some(50)),
                ("Zosēni", Some(5)),
                ("Zosēni", None),
                ("Ainaži", Some(30)),
                ("Ainaži", Some(10)),
            ]
        );
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let mut first = obs("x", "Same", Some(1));
        first.value = Some(1.0);
        let mut second = obs("y", "Same", Some(1));
        second.value = Some(2.0);

        let mut list = vec![first.clone(), second.clone()];
        sort_observations(&mut list);
        assert_eq!(list, vec![first, second]);
    }

    #[test]
    fn test_count_stations_ignores_blank_ids() {
        let list = vec![
            obs("A", "a", Some(1)),
            obs("A", "a", Some(2)),
            obs(" B ", "b", None),
            obs("", "blank", Some(3)),
        ];
        assert_eq!(count_stations(&list), 2);
    }

    #[test]
    fn test_overwrite_metadata_only_where_present() {
        let mut stored = MetricDocument::new("HRLH");
        stored.en_description = Some("Humidity".to_string());
        stored.unit = Some("%".to_string());

        let mut incoming = MetricDocument::new("ignored");
        incoming.unit = Some("percent".to_string());
        incoming.scale = Some(ScalarValue::Integer(1));

        stored.overwrite_metadata(&incoming);
        assert_eq!(stored.abbreviation, "HRLH");
        assert_eq!(stored.en_description.as_deref(), Some("Humidity"));
        assert_eq!(stored.unit.as_deref(), Some("percent"));
        assert_eq!(stored.scale, Some(ScalarValue::Integer(1)));
    }

    #[test]
    fn test_unknown_keys_survive_a_round_trip() -> Result<(), serde_json::Error> {
        let raw = json!({
            "ABBREVIATION": "TDRY",
            "SCALE": 1,
            "LOWER_LIMIT": -50.5,
            "UPPER_LIMIT": "60",
            "TOTAL_STATIONS": 0,
            "UPDATED_BY": "ops",
            "OBSERVATIONS": []
        });
        let doc: MetricDocument = serde_json::from_value(raw)?;
        assert_eq!(doc.scale, Some(ScalarValue::Integer(1)));
        assert_eq!(doc.lower_limit, Some(ScalarValue::Float(-50.5)));
        assert_eq!(doc.upper_limit, Some(ScalarValue::Text("60".to_string())));
        assert_eq!(doc.extra.get("UPDATED_BY"), Some(&json!("ops")));

        let back = serde_json::to_value(&doc)?;
        assert_eq!(back["UPDATED_BY"], json!("ops"));
        Ok(())
    }

    #[test]
    fn test_scalar_from_source_json() {
        assert_eq!(ScalarValue::from_json(&json!(2)), Some(ScalarValue::Integer(2)));
        assert_eq!(ScalarValue::from_json(&json!(0.5)), Some(ScalarValue::Float(0.5)));
        assert_eq!(ScalarValue::from_json(&json!("")), None);
        assert_eq!(ScalarValue::from_json(&Value::Null), None);
    }

    #[test]
    fn test_distinct_epochs_sorted() {
        let mut doc = MetricDocument::new("X");
        doc.observations = vec![
            obs("a", "a", Some(30)),
            obs("b", "b", Some(10)),
            obs("c", "c", Some(30)),
            obs("d", "d", None),
        ];
        assert_eq!(doc.distinct_epochs(), vec![10, 30]);
    }
}
