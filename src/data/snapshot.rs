//! Sensor snapshot model and payload validation.
//!
//! A snapshot is one complete reading pushed by the backend. The wire shape
//! groups values by the sensor that produced them:
//!
//! ```json
//! {
//!   "mq135":   { "value": 250, "unit": "ppm" },
//!   "dht22":   { "temperature": 22.0, "humidity": 55.0 },
//!   "pms5003": { "pm25": 10.0, "pm10": 20.0 },
//!   "fc28":    { "value": 60.0 },
//!   "tds":     { "value": 200.0 },
//!   "location": { "city": "Pune", "country": "India" },
//!   "timestamp": "2025-01-05T10:15:00.123456"
//! }
//! ```
//!
//! Parsing is all-or-nothing: a payload missing any of the five sensor
//! groups is rejected rather than forwarded as a partial snapshot. Values
//! are never clamped; out-of-range readings are a display concern.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ValidationError;

/// Particulate matter concentrations from the PMS5003 sensor, in µg/m³.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Particulate {
    pub pm25: f64,
    pub pm10: f64,
}

/// Where the readings were taken, when the backend knows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub city: String,
    pub country: String,
}

impl Location {
    /// "City, Country" for display.
    pub fn label(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }
}

/// One complete, validated sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    /// MQ-135 air quality indicator (ppm scale).
    pub air_quality: f64,
    /// DHT22 temperature in °C.
    pub temperature_c: f64,
    /// DHT22 relative humidity in percent.
    pub humidity_pct: f64,
    /// PMS5003 particulate readings.
    pub particulate: Particulate,
    /// FC-28 water tank level in percent.
    pub tank_level_pct: f64,
    /// TDS water quality reading (ppm).
    pub water_quality: f64,
    pub location: Option<Location>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl SensorSnapshot {
    /// Encode back into the nested wire shape.
    pub fn to_wire(&self) -> Value {
        let mut wire = json!({
            "mq135": { "value": self.air_quality },
            "dht22": {
                "temperature": self.temperature_c,
                "humidity": self.humidity_pct,
            },
            "pms5003": {
                "pm25": self.particulate.pm25,
                "pm10": self.particulate.pm10,
            },
            "fc28": { "value": self.tank_level_pct },
            "tds": { "value": self.water_quality },
        });

        if let Value::Object(ref mut map) = wire {
            map.insert(
                "location".to_string(),
                self.location
                    .as_ref()
                    .map(|l| json!({ "city": l.city, "country": l.country }))
                    .unwrap_or(Value::Null),
            );
            if let Some(ts) = self.timestamp {
                map.insert("timestamp".to_string(), Value::String(ts.to_rfc3339()));
            }
        }

        wire
    }
}

impl TryFrom<&Value> for SensorSnapshot {
    type Error = ValidationError;

    fn try_from(raw: &Value) -> Result<Self, Self::Error> {
        parse_snapshot(raw)
    }
}

/// Validate an untyped payload into a [`SensorSnapshot`].
///
/// Fails with [`ValidationError::MissingField`] when a sensor group (or a
/// numeric member of one) is absent and [`ValidationError::TypeMismatch`]
/// when a numeric field is not a finite number.
pub fn parse_snapshot(raw: &Value) -> Result<SensorSnapshot, ValidationError> {
    let root = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    // All groups are looked up before any member so that an absent group is
    // always reported as missing, whichever group comes first.
    let mq135 = group(root, "mq135")?;
    let dht22 = group(root, "dht22")?;
    let pms5003 = group(root, "pms5003")?;
    let fc28 = group(root, "fc28")?;
    let tds = group(root, "tds")?;

    Ok(SensorSnapshot {
        air_quality: number(mq135, "mq135", "value")?,
        temperature_c: number(dht22, "dht22", "temperature")?,
        humidity_pct: number(dht22, "dht22", "humidity")?,
        particulate: Particulate {
            pm25: number(pms5003, "pms5003", "pm25")?,
            pm10: number(pms5003, "pms5003", "pm10")?,
        },
        tank_level_pct: number(fc28, "fc28", "value")?,
        water_quality: number(tds, "tds", "value")?,
        location: location(root),
        timestamp: root.get("timestamp").map(parse_timestamp).transpose()?.flatten(),
    })
}

/// Decode raw frame bytes as JSON and validate them.
pub fn parse_snapshot_bytes(bytes: &[u8]) -> Result<SensorSnapshot, ValidationError> {
    let raw: Value =
        serde_json::from_slice(bytes).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    parse_snapshot(&raw)
}

fn group<'a>(
    root: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    match root.get(name) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(name.to_string())),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(ValidationError::TypeMismatch {
            field: name.to_string(),
            found: type_name(other).to_string(),
        }),
    }
}

fn number(
    group: &Map<String, Value>,
    group_name: &str,
    member: &str,
) -> Result<f64, ValidationError> {
    let field = || format!("{}.{}", group_name, member);
    match group.get(member) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field())),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(ValidationError::TypeMismatch {
                field: field(),
                found: n.to_string(),
            }),
        },
        Some(other) => Err(ValidationError::TypeMismatch {
            field: field(),
            found: type_name(other).to_string(),
        }),
    }
}

/// The location is display-only, so anything short of a city and country
/// is treated as unknown rather than rejected.
fn location(root: &Map<String, Value>) -> Option<Location> {
    let loc = root.get("location")?.as_object()?;
    let city = loc.get("city")?.as_str()?;
    let country = loc.get("country")?.as_str()?;
    if city.is_empty() || country.is_empty() {
        return None;
    }
    Some(Location {
        city: city.to_string(),
        country: country.to_string(),
    })
}

/// Accepts RFC 3339 and the naive ISO-8601 form the backend emits
/// (`datetime.isoformat()` without offset), which is read as UTC.
fn parse_timestamp(raw: &Value) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let text = match raw {
        Value::Null => return Ok(None),
        Value::String(s) => s.as_str(),
        other => return Err(ValidationError::InvalidTimestamp(other.to_string())),
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| ValidationError::InvalidTimestamp(text.to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn sample() -> Value {
        json!({
            "mq135": { "value": 250, "unit": "ppm", "name": "Air Quality (MQ-135)" },
            "dht22": { "temperature": 22, "humidity": 55 },
            "tds": { "value": 200 },
            "fc28": { "value": 60 },
            "pms5003": { "pm25": 10, "pm10": 20 }
        })
    }

    #[test]
    fn test_parse_complete_payload() {
        let snapshot = parse_snapshot(&sample()).unwrap();
        assert_eq!(snapshot.air_quality, 250.0);
        assert_eq!(snapshot.temperature_c, 22.0);
        assert_eq!(snapshot.humidity_pct, 55.0);
        assert_eq!(snapshot.particulate, Particulate { pm25: 10.0, pm10: 20.0 });
        assert_eq!(snapshot.tank_level_pct, 60.0);
        assert_eq!(snapshot.water_quality, 200.0);
        assert!(snapshot.location.is_none());
        assert!(snapshot.timestamp.is_none());
    }

    #[test]
    fn test_missing_any_group_is_rejected() {
        for name in ["mq135", "dht22", "tds", "fc28", "pms5003"] {
            let mut raw = sample();
            raw.as_object_mut().unwrap().remove(name);
            assert_eq!(
                parse_snapshot(&raw),
                Err(ValidationError::MissingField(name.to_string())),
                "removing {name}"
            );
        }
    }

    #[test]
    fn test_null_group_counts_as_missing() {
        let mut raw = sample();
        raw["fc28"] = Value::Null;
        assert_eq!(
            parse_snapshot(&raw),
            Err(ValidationError::MissingField("fc28".to_string()))
        );
    }

    #[test]
    fn test_missing_member_is_reported_with_path() {
        let mut raw = sample();
        raw["dht22"].as_object_mut().unwrap().remove("humidity");
        assert_eq!(
            parse_snapshot(&raw),
            Err(ValidationError::MissingField("dht22.humidity".to_string()))
        );
    }

    #[test]
    fn test_non_numeric_value_is_type_mismatch() {
        let mut raw = sample();
        raw["mq135"]["value"] = json!("250");
        match parse_snapshot(&raw) {
            Err(ValidationError::TypeMismatch { field, found }) => {
                assert_eq!(field, "mq135.value");
                assert_eq!(found, "string");
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }

        let mut raw = sample();
        raw["pms5003"] = json!([10, 20]);
        assert!(matches!(
            parse_snapshot(&raw),
            Err(ValidationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_not_an_object() {
        assert_eq!(parse_snapshot(&json!([1, 2])), Err(ValidationError::NotAnObject));
    }

    #[test]
    fn test_malformed_bytes() {
        assert!(matches!(
            parse_snapshot_bytes(b"not json"),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn test_values_are_not_clamped() {
        let mut raw = sample();
        raw["dht22"]["humidity"] = json!(140.5);
        raw["fc28"]["value"] = json!(-3);
        let snapshot = parse_snapshot(&raw).unwrap();
        assert_eq!(snapshot.humidity_pct, 140.5);
        assert_eq!(snapshot.tank_level_pct, -3.0);
    }

    #[test]
    fn test_naive_timestamp_is_read_as_utc() {
        let mut raw = sample();
        raw["timestamp"] = json!("2025-01-05T10:15:00.123456");
        let ts = parse_snapshot(&raw).unwrap().timestamp.unwrap();
        assert_eq!(ts.year(), 2025);
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.minute(), 15);
    }

    #[test]
    fn test_rfc3339_timestamp_with_offset() {
        let mut raw = sample();
        raw["timestamp"] = json!("2025-01-05T10:15:00+05:30");
        let ts = parse_snapshot(&raw).unwrap().timestamp.unwrap();
        assert_eq!(ts.hour(), 4);
        assert_eq!(ts.minute(), 45);
    }

    #[test]
    fn test_invalid_timestamp() {
        let mut raw = sample();
        raw["timestamp"] = json!("yesterday");
        assert_eq!(
            parse_snapshot(&raw),
            Err(ValidationError::InvalidTimestamp("yesterday".to_string()))
        );
    }

    #[test]
    fn test_partial_location_is_ignored() {
        let mut raw = sample();
        raw["location"] = json!({ "city": "Pune" });
        assert!(parse_snapshot(&raw).unwrap().location.is_none());

        raw["location"] = json!({ "city": "Pune", "country": "India" });
        let location = parse_snapshot(&raw).unwrap().location.unwrap();
        assert_eq!(location.label(), "Pune, India");
    }

    #[test]
    fn test_wire_round_trip_preserves_values() {
        let mut raw = sample();
        raw["location"] = json!({ "city": "Nashik", "country": "India" });
        raw["timestamp"] = json!("2025-03-01T08:00:00Z");
        raw["pms5003"]["pm25"] = json!(12.345);

        let snapshot = parse_snapshot(&raw).unwrap();
        let again = parse_snapshot(&snapshot.to_wire()).unwrap();
        assert_eq!(snapshot, again);
    }
}
