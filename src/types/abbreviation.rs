//! The operational metrics synchronised by default, keyed by the abbreviation the
//! portal uses in its observation resource.

/// Abbreviations of the operational metrics kept in the document store, with the
/// portal's English description of each.
pub const OPERATIONAL_METRICS: [(&str, &str); 30] = [
    ("HATMN", "The hourly minimum of air temperature"),
    ("HPRAB", "The total amount of precipitation within an hour"),
    ("HPRSL", "The hourly average atmospheric pressure at sea level"),
    ("HRLH", "The hourly average relative humidity"),
    ("HSNOW", "The hourly average snow depth"),
    ("HTDRY", "The hourly average air temperature"),
    ("HWDAV", "The hourly average wind direction"),
    ("HWDMX", "The direction of the hourly maximum wind gusts"),
    ("HWNDS", "The hourly average wind speed"),
    ("VSBAV", "The hourly average meteorological visibility"),
    ("WNS10", "Average wind speed during the observation time"),
    ("WPGST", "Maximum wind gusts during the observation time"),
    ("VSBA", "Meteorological visibility during the observation time"),
    ("SNOWA", "Snow depth during the observation time"),
    ("WNDD10", "Average wind direction during the observation time"),
    ("PHENO", "Atmospheric phenomena"),
    ("PRSL", "Atmospheric pressure at sea level during the observation time"),
    ("RLH", "Relative humidity during the observation time"),
    ("TDRY", "Air temperature during the observation time"),
    ("LI10I", "Number of lightning strikes with current > 10 kA"),
    ("LICC", "Number of cloud-cloud lightning strikes"),
    ("LIGC", "Number of cloud-ground lightning strikes"),
    ("LIMAXI", "Maximum current of lightning strikes"),
    ("LITOT", "Total number of lightning strikes"),
    ("HATMX", "The hourly maximum of air temperature"),
    ("HWSMX", "The hourly maximum wind gusts"),
    ("PRSS", "Atmospheric pressure at station level during the observation time"),
    ("SAJT", "Apparent temperature during the observation time"),
    ("CCTMX", "The hourly maximum amount of cloud cover"),
    ("UVIL", "Ultraviolet radiation index during the observation time"),
];

/// The default abbreviation list as owned strings, in catalogue order.
pub fn operational_abbreviations() -> Vec<String> {
    OPERATIONAL_METRICS
        .iter()
        .map(|(abbr, _)| abbr.to_string())
        .collect()
}

/// The catalogue description of `abbreviation`, if it is one of the operational metrics.
pub fn describe(abbreviation: &str) -> Option<&'static str> {
    OPERATIONAL_METRICS
        .iter()
        .find(|(abbr, _)| *abbr == abbreviation)
        .map(|(_, description)| *description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalogue_has_unique_codes() {
        let codes: HashSet<&str> = OPERATIONAL_METRICS.iter().map(|(a, _)| *a).collect();
        assert_eq!(codes.len(), OPERATIONAL_METRICS.len());
        assert_eq!(operational_abbreviations().first().map(String::as_str), Some("HATMN"));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe("HTDRY"), Some("The hourly average air temperature"));
        assert_eq!(describe("NOPE"), None);
    }
}
