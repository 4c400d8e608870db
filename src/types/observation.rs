//! Defines the [`Observation`] record stored inside every metric document: one
//! station reading at one timestamp, enriched with the station's metadata.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single station reading at a single timestamp.
///
/// Field names on the wire follow the existing collection (`STATION_ID`, `NAME`,
/// `DATETIME_LV`, ...), so documents written by earlier tooling stay readable.
///
/// The pair (`station_id`, `datetime_epoch`) identifies an observation inside a
/// [`crate::MetricDocument`]. Records lacking either part are never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    /// Station identifier as published by the station dictionary (e.g. "RIGASLU").
    #[serde(rename = "STATION_ID", default, deserialize_with = "lenient_string")]
    pub station_id: String,
    /// Human readable station name; empty when the station is not in the dictionary.
    #[serde(rename = "NAME", default, deserialize_with = "lenient_string")]
    pub station_name: String,
    #[serde(rename = "WMO_ID", default, deserialize_with = "lenient_string")]
    pub wmo_id: String,
    #[serde(rename = "BEGIN_DATE", default, deserialize_with = "lenient_string")]
    pub begin_date: String,
    #[serde(rename = "LATITUDE", default)]
    pub latitude: Option<f64>,
    #[serde(rename = "LONGITUDE", default)]
    pub longitude: Option<f64>,
    /// Gauss-Krüger easting/northing of the station.
    #[serde(rename = "GAUSS1", default)]
    pub gauss1: Option<f64>,
    #[serde(rename = "GAUSS2", default)]
    pub gauss2: Option<f64>,
    /// Geographic longitude (`GEOGR1`) and latitude (`GEOGR2`) in decimal degrees.
    #[serde(rename = "GEOGR1", default)]
    pub geogr1: Option<f64>,
    #[serde(rename = "GEOGR2", default)]
    pub geogr2: Option<f64>,
    #[serde(rename = "ELEVATION", default)]
    pub elevation: Option<f64>,
    #[serde(rename = "ELEVATION_PRESSURE", default)]
    pub elevation_pressure: Option<f64>,
    /// UTC seconds since the Unix epoch.
    #[serde(rename = "DATETIME_EPOCH", default, deserialize_with = "lenient_epoch")]
    pub datetime_epoch: Option<i64>,
    /// ISO-8601 rendering of `datetime_epoch` in the civil timezone (e.g. `2024-05-01T15:00:00+03:00`).
    #[serde(rename = "DATETIME_LV", default)]
    pub datetime_local: Option<String>,
    #[serde(rename = "VALUE", default)]
    pub value: Option<f64>,
}

impl Observation {
    /// The trimmed station id, or `None` when it is empty.
    pub fn station_key(&self) -> Option<&str> {
        let trimmed = self.station_id.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// The dedup key of this observation, present only when both parts are valid.
    pub fn identity(&self) -> Option<(&str, i64)> {
        Some((self.station_key()?, self.datetime_epoch?))
    }
}

/// Accepts a string, a number or null for fields that older writers stored
/// inconsistently. Null becomes the empty string.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct LenientString;

    impl Visitor<'_> for LenientString {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or a number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(LenientString)
}

/// Accepts an integer, a float (truncated towards zero) or a numeric string.
/// Anything unparseable becomes `None` instead of failing the whole document.
fn lenient_epoch<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct LenientEpoch;

    impl Visitor<'_> for LenientEpoch {
        type Value = Option<i64>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an epoch in seconds")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(i64::try_from(v).ok())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(v.is_finite().then_some(v.trunc() as i64))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let v = v.trim();
            Ok(v.parse::<i64>()
                .ok()
                .or_else(|| v.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)))
        }

        fn visit_bool<E: de::Error>(self, _v: bool) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(LenientEpoch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reads_existing_wire_format() -> Result<(), serde_json::Error> {
        let obs: Observation = serde_json::from_value(json!({
            "STATION_ID": "RIAI99PA",
            "NAME": "Rīga",
            "WMO_ID": "26422",
            "BEGIN_DATE": "1850-01-01",
            "LATITUDE": 56.95,
            "LONGITUDE": 24.1,
            "GEOGR1": 24.1,
            "GEOGR2": 56.95,
            "ELEVATION": 3.5,
            "DATETIME_EPOCH": 1714564800,
            "DATETIME_LV": "2024-05-01T15:00:00+03:00",
            "VALUE": 12.4
        }))?;

        assert_eq!(obs.station_name, "Rīga");
        assert_eq!(obs.identity(), Some(("RIAI99PA", 1714564800)));
        assert_eq!(obs.gauss1, None);
        assert_eq!(obs.elevation_pressure, None);
        Ok(())
    }

    #[test]
    fn test_lenient_identity_fields() -> Result<(), serde_json::Error> {
        let float_epoch: Observation =
            serde_json::from_value(json!({"STATION_ID": 26422, "DATETIME_EPOCH": 1714564800.0}))?;
        assert_eq!(float_epoch.identity(), Some(("26422", 1714564800)));

        let string_epoch: Observation =
            serde_json::from_value(json!({"STATION_ID": "A", "DATETIME_EPOCH": " 42 "}))?;
        assert_eq!(string_epoch.datetime_epoch, Some(42));

        let garbage: Observation =
            serde_json::from_value(json!({"STATION_ID": null, "DATETIME_EPOCH": "soon"}))?;
        assert_eq!(garbage.station_id, "");
        assert_eq!(garbage.datetime_epoch, None);
        assert_eq!(garbage.identity(), None);
        Ok(())
    }

    #[test]
    fn test_blank_station_has_no_identity() {
        let obs = Observation {
            station_id: "   ".to_string(),
            datetime_epoch: Some(10),
            ..Default::default()
        };
        assert_eq!(obs.station_key(), None);
        assert_eq!(obs.identity(), None);
    }
}
