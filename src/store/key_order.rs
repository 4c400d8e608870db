use crate::types::metric_document::MetricDocument;
use serde_json::{Map, Value};

/// Key that always sorts last in a document.
pub const OBSERVATIONS_KEY: &str = "OBSERVATIONS";

/// Orders top-level keys case-insensitively, with `OBSERVATIONS` last.
pub fn reorder_top_level(map: Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(String, Value)> = map.into_iter().collect();
    entries.sort_by_cached_key(|(key, _)| (key == OBSERVATIONS_KEY, key.to_lowercase()));
    entries.into_iter().collect()
}

/// A document as a JSON object in storage key order.
pub fn to_ordered_map(document: &MetricDocument) -> Result<Map<String, Value>, serde_json::Error> {
    let map: Map<String, Value> = serde_json::from_value(serde_json::to_value(document)?)?;
    Ok(reorder_top_level(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_observations_last_rest_case_insensitive() {
        let Value::Object(map) = json!({
            "OBSERVATIONS": [],
            "upper_limit": 1,
            "ABBREVIATION": "HTDRY",
            "Lower": 2,
            "TOTAL_STATIONS": 0,
        }) else {
            panic!("not an object");
        };
        let keys: Vec<String> = reorder_top_level(map).keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["ABBREVIATION", "Lower", "TOTAL_STATIONS", "upper_limit", "OBSERVATIONS"]
        );
    }

    #[test]
    fn test_document_keys_in_storage_order() -> Result<(), serde_json::Error> {
        let mut doc = MetricDocument::new("HTDRY");
        doc.extra.insert("NOTE".to_string(), json!("x"));
        let keys: Vec<String> = to_ordered_map(&doc)?.keys().cloned().collect();
        assert_eq!(keys.last().map(String::as_str), Some(OBSERVATIONS_KEY));
        assert_eq!(keys.first().map(String::as_str), Some("ABBREVIATION"));
        let note = keys.iter().position(|k| k == "NOTE");
        let scale = keys.iter().position(|k| k == "SCALE");
        assert!(note < scale);
        Ok(())
    }
}
