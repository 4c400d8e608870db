//! Station dictionary entries as joined onto observations.

use crate::source::record::RawRecord;

/// Metadata for one observation station, taken from the station dictionary.
///
/// Coordinates and elevations are `None` when the dictionary leaves them blank or
/// publishes something that is not a number.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Station {
    /// The station identifier (e.g. "RIGASLU").
    pub id: String,
    pub name: String,
    /// World Meteorological Organization identifier, empty if the station has none.
    pub wmo_id: String,
    /// Date the station started reporting, as published.
    pub begin_date: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub gauss1: Option<f64>,
    pub gauss2: Option<f64>,
    pub geogr1: Option<f64>,
    pub geogr2: Option<f64>,
    /// Elevation above sea level in meters.
    pub elevation: Option<f64>,
    /// Elevation of the barometer in meters.
    pub elevation_pressure: Option<f64>,
}

impl Station {
    /// Builds a station from a dictionary row. Rows without a station id are
    /// unusable for joining and yield `None`.
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        let id = record.text("STATION_ID");
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            name: record.text("NAME"),
            wmo_id: record.text("WMO_ID"),
            begin_date: record.text("BEGIN_DATE"),
            latitude: record.number("LATITUDE"),
            longitude: record.number("LONGITUDE"),
            gauss1: record.number("GAUSS1"),
            gauss2: record.number("GAUSS2"),
            geogr1: record.number("GEOGR1"),
            geogr2: record.number("GEOGR2"),
            elevation: record.number("ELEVATION"),
            elevation_pressure: record.number("ELEVATION_PRESSURE"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_station_from_dictionary_row() {
        let record = RawRecord::from_value(json!({
            "_id": 7,
            "STATION_ID": " RIAI99PA ",
            "NAME": "Rīga",
            "WMO_ID": 26422,
            "BEGIN_DATE": "1850-01-01T00:00:00",
            "LATITUDE": "56,9495",
            "LONGITUDE": 24.1,
            "GEOGR1": "24.116",
            "ELEVATION": "n/a",
        }))
        .expect("object row");

        let station = Station::from_record(&record).expect("station id present");
        assert_eq!(station.id, "RIAI99PA");
        assert_eq!(station.name, "Rīga");
        assert_eq!(station.wmo_id, "26422");
        assert_eq!(station.latitude, Some(56.9495));
        assert_eq!(station.longitude, Some(24.1));
        assert_eq!(station.geogr1, Some(24.116));
        assert_eq!(station.elevation, None);
        assert_eq!(station.gauss1, None);
    }

    #[test]
    fn test_station_without_id_is_skipped() {
        let record = RawRecord::from_value(json!({"STATION_ID": "  ", "NAME": "ghost"}))
            .expect("object row");
        assert!(Station::from_record(&record).is_none());
    }
}
