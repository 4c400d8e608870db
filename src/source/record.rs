use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One flat row as returned by the CKAN datastore. Field types vary between
/// resources (ids arrive as strings or numbers, decimals sometimes use a comma),
/// so values are kept as JSON and coerced on access.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    /// Wraps a JSON object. Returns `None` for any other JSON value.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The field rendered as trimmed text. Missing and null fields are empty.
    pub fn text(&self, field: &str) -> String {
        match self.0.get(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// The field as a float, see [`to_float`].
    pub fn number(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(to_float)
    }
}

/// Coerces a JSON value to a float. Numbers pass through; strings are parsed with
/// a comma accepted as the decimal separator; everything else is `None`.
pub fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.replace(',', ".").parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}
