//! Query fingerprints

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters that change what the upstream returns. Everything else only
/// filters an already fetched result set and stays out of the key.
pub const KEY_FIELDS: &[&str] = &["from-station", "to-station", "date", "traveler-class", "discount", "fast-connections"];

/// A fare query as the caller describes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(rename = "from-station")]
    pub from_station: String,

    #[serde(rename = "to-station")]
    pub to_station: String,

    pub date: NaiveDate,

    #[serde(rename = "traveler-class", default = "default_class")]
    pub traveler_class: String,

    #[serde(default)]
    pub discount: Option<String>,

    #[serde(rename = "fast-connections", default)]
    pub fast_connections: bool,

    /// Earliest departure, "HH:MM"; filter only
    #[serde(rename = "earliest-departure", default)]
    pub earliest_departure: Option<String>,

    /// Latest departure, "HH:MM"; filter only
    #[serde(rename = "latest-departure", default)]
    pub latest_departure: Option<String>,

    /// Filter only
    #[serde(rename = "max-transfers", default)]
    pub max_transfers: Option<u8>,
}

fn default_class() -> String {
    "second".to_string()
}

impl QueryParams {
    pub fn new(from_station: impl Into<String>, to_station: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            from_station: from_station.into(),
            to_station: to_station.into(),
            date,
            traveler_class: default_class(),
            discount: None,
            fast_connections: false,
            earliest_departure: None,
            latest_departure: None,
            max_transfers: None,
        }
    }

    /// Same query for another day
    pub fn on(&self, date: NaiveDate) -> Self {
        Self { date, ..self.clone() }
    }
}

/// Fingerprint a query. Deterministic and independent of field order.
pub fn make_key(params: &QueryParams) -> String {
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => make_key_from_map(&map),
        // A struct always serializes to an object
        _ => String::new(),
    }
}

/// Value a typed [`QueryParams`] carries when the caller leaves a key field out
fn field_default(field: &str) -> Option<Value> {
    match field {
        "traveler-class" => Some(Value::String(default_class())),
        "fast-connections" => Some(Value::Bool(false)),
        _ => None,
    }
}

/// Fingerprint a loosely typed query, e.g. one decoded from a request body.
///
/// Only [`KEY_FIELDS`] contribute. Null values and absent fields are
/// equivalent and take the same defaults as [`QueryParams`]. String values
/// are trimmed.
pub fn make_key_from_map(params: &Map<String, Value>) -> String {
    let canonical: Map<String, Value> = KEY_FIELDS
        .iter()
        .filter_map(|field| {
            let value = match params.get(*field) {
                None | Some(Value::Null) => field_default(field)?,
                Some(Value::String(s)) => Value::String(s.trim().to_string()),
                Some(other) => other.clone(),
            };
            Some((field.to_string(), value))
        })
        .collect();

    // serde_json's default map is ordered by key
    Value::Object(canonical).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> QueryParams {
        QueryParams::new("8000105", "8000261", NaiveDate::from_ymd_opt(2026, 11, 3).unwrap())
    }

    #[test]
    fn test_key_is_deterministic() {
        assert_eq!(make_key(&params()), make_key(&params()));
    }

    #[test]
    fn test_filter_fields_do_not_change_key() {
        let base = params();
        let mut filtered = params();
        filtered.earliest_departure = Some("06:00".to_string());
        filtered.latest_departure = Some("12:00".to_string());
        filtered.max_transfers = Some(1);
        assert_eq!(make_key(&base), make_key(&filtered));
    }

    #[test]
    fn test_key_fields_change_key() {
        let base = make_key(&params());

        let mut other = params();
        other.fast_connections = true;
        assert_ne!(base, make_key(&other));

        let mut other = params();
        other.discount = Some("bc25".to_string());
        assert_ne!(base, make_key(&other));

        let other = params().on(NaiveDate::from_ymd_opt(2026, 11, 4).unwrap());
        assert_ne!(base, make_key(&other));
    }

    #[test]
    fn test_map_key_is_order_independent() {
        let a = json!({"date": "2026-11-03", "from-station": "A", "to-station": "B"});
        let b = json!({"to-station": "B", "from-station": "A", "date": "2026-11-03"});
        let (Value::Object(a), Value::Object(b)) = (a, b) else {
            unreachable!()
        };
        assert_eq!(make_key_from_map(&a), make_key_from_map(&b));
    }

    #[test]
    fn test_map_key_ignores_nulls_and_whitespace() {
        let a = json!({"from-station": " A ", "to-station": "B", "discount": null, "max-transfers": 2});
        let b = json!({"from-station": "A", "to-station": "B"});
        let (Value::Object(a), Value::Object(b)) = (a, b) else {
            unreachable!()
        };
        assert_eq!(make_key_from_map(&a), make_key_from_map(&b));
    }

    #[test]
    fn test_typed_and_map_keys_agree() {
        let map = json!({
            "from-station": "8000105",
            "to-station": "8000261",
            "date": "2026-11-03",
            "traveler-class": "second",
            "fast-connections": false,
        });
        let Value::Object(map) = map else { unreachable!() };
        assert_eq!(make_key(&params()), make_key_from_map(&map));
    }

    #[test]
    fn test_map_key_applies_typed_defaults() {
        let sparse = json!({"from-station": "8000105", "to-station": "8000261", "date": "2026-11-03"});
        let Value::Object(sparse) = sparse else { unreachable!() };
        assert_eq!(make_key(&params()), make_key_from_map(&sparse));

        let explicit_null = json!({
            "from-station": "8000105",
            "to-station": "8000261",
            "date": "2026-11-03",
            "traveler-class": null,
        });
        let Value::Object(explicit_null) = explicit_null else { unreachable!() };
        assert_eq!(make_key_from_map(&sparse), make_key_from_map(&explicit_null));
    }
}
