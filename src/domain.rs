use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IngestError;

/// one temperature/humidity sample as recorded by the collector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// temperature in celsius
    #[serde(deserialize_with = "measure::deserialize")]
    pub temperature: f64,
    /// relative humidity (0-100%)
    #[serde(deserialize_with = "measure::deserialize")]
    pub humidity: f64,
    /// server-side arrival time (local, no offset)
    #[serde(with = "crate::timestamp")]
    pub timestamp: NaiveDateTime,
}

impl Reading {
    pub fn new(temperature: f64, humidity: f64, timestamp: NaiveDateTime) -> Self {
        Self { temperature, humidity, timestamp }
    }

    /// stamp a sample with the current local time
    pub fn now(sample: ClimateSample) -> Self {
        Self::new(sample.temperature, sample.humidity, chrono::Local::now().naive_local())
    }
}

/// wire payload pushed by the sensor node to `/api/datos`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClimateSample {
    pub temperature: f64,
    pub humidity: f64,
}

impl ClimateSample {
    /// lenient decode of an ingest body
    ///
    /// missing fields become 0, numbers, booleans and numeric strings are
    /// accepted, anything else rejects the whole request.
    pub fn from_json(body: &Value) -> Result<Self, IngestError> {
        let object = body.as_object().ok_or(IngestError::NotAnObject)?;
        Ok(Self {
            temperature: coerce_number("temperature", object.get("temperature"))?,
            humidity: coerce_number("humidity", object.get("humidity"))?,
        })
    }
}

fn coerce_number(field: &'static str, value: Option<&Value>) -> Result<f64, IngestError> {
    let invalid = |v: &Value| IngestError::InvalidField { field, value: v.to_string() };

    let Some(value) = value else {
        return Ok(0.0);
    };

    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| invalid(value)),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => parse_float_literal(s).ok_or_else(|| invalid(value)),
        _ => Err(invalid(value)),
    }
}

/// parse a float the way a human-typed literal is usually meant:
/// surrounding whitespace is ignored, `nan`/`inf`/`infinity` are accepted
fn parse_float_literal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (sign, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    match body.to_ascii_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        "inf" | "infinity" => Some(sign * f64::INFINITY),
        "" => None,
        _ => trimmed.parse::<f64>().ok(),
    }
}

/// stored measurements: empty fields and nulls read back as NaN
mod measure {
    use serde::{de::Error, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(f64::NAN),
            Some(Raw::Number(v)) => Ok(v),
            Some(Raw::Text(s)) if s.trim().is_empty() => Ok(f64::NAN),
            Some(Raw::Text(s)) => super::parse_float_literal(&s)
                .ok_or_else(|| D::Error::custom(format!("invalid measurement {:?}", s))),
        }
    }
}

/// alarm state derived from the most recent reading only
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Alarms {
    pub temperature_high: bool,
    pub humidity_high: bool,
}

impl Alarms {
    /// both thresholds are inclusive
    pub fn evaluate(last: &Reading, temperature_limit: f64, humidity_limit: f64) -> Self {
        Self {
            temperature_high: last.temperature >= temperature_limit,
            humidity_high: last.humidity >= humidity_limit,
        }
    }

    pub fn any(&self) -> bool {
        self.temperature_high || self.humidity_high
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reading(t: f64, h: f64) -> Reading {
        Reading::new(t, h, NaiveDateTime::default())
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let sample = ClimateSample::from_json(&json!({})).unwrap();
        assert_eq!(sample, ClimateSample { temperature: 0.0, humidity: 0.0 });

        let sample = ClimateSample::from_json(&json!({"temperature": 21.5})).unwrap();
        assert_eq!(sample.temperature, 21.5);
        assert_eq!(sample.humidity, 0.0);
    }

    #[test]
    fn test_numeric_strings_and_bools_are_coerced() {
        let sample = ClimateSample::from_json(&json!({"temperature": " 29.5 ", "humidity": true})).unwrap();
        assert_eq!(sample.temperature, 29.5);
        assert_eq!(sample.humidity, 1.0);

        let sample = ClimateSample::from_json(&json!({"temperature": "-inf", "humidity": "NaN"})).unwrap();
        assert_eq!(sample.temperature, f64::NEG_INFINITY);
        assert!(sample.humidity.is_nan());
    }

    #[test]
    fn test_unconvertible_values_are_rejected() {
        let err = ClimateSample::from_json(&json!({"temperature": "warm"})).unwrap_err();
        assert!(matches!(err, IngestError::InvalidField { field: "temperature", .. }));

        let err = ClimateSample::from_json(&json!({"humidity": null})).unwrap_err();
        assert!(matches!(err, IngestError::InvalidField { field: "humidity", .. }));

        let err = ClimateSample::from_json(&json!({"humidity": [80]})).unwrap_err();
        assert!(matches!(err, IngestError::InvalidField { field: "humidity", .. }));
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        let err = ClimateSample::from_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, IngestError::NotAnObject));
    }

    #[test]
    fn test_reading_tolerates_null_measurements() {
        let reading: Reading = serde_json::from_value(json!({
            "temperature": null,
            "humidity": 55,
            "timestamp": "2024-05-01 08:00:00.000000",
        }))
        .unwrap();
        assert!(reading.temperature.is_nan());
        assert_eq!(reading.humidity, 55.0);
    }

    #[test]
    fn test_alarm_thresholds_are_inclusive() {
        let alarms = Alarms::evaluate(&reading(28.0, 80.0), 28.0, 80.0);
        assert!(alarms.temperature_high);
        assert!(alarms.humidity_high);

        let alarms = Alarms::evaluate(&reading(27.99, 79.99), 28.0, 80.0);
        assert!(!alarms.temperature_high);
        assert!(!alarms.humidity_high);
        assert!(!alarms.any());
    }

    #[test]
    fn test_alarms_are_independent() {
        let alarms = Alarms::evaluate(&reading(35.0, 10.0), 28.0, 80.0);
        assert_eq!(alarms, Alarms { temperature_high: true, humidity_high: false });
    }
}
