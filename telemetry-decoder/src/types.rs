//! Core types for the telemetry decoder library
//!
//! This module defines the values the library emits: the canonical tree every
//! record is normalized into, extracted records with normalized timestamps,
//! decoded signal values, and the error type shared by all components.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors that can occur while loading layouts or extracting records
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Source not found: {0:?}")]
    SourceNotFound(PathBuf),

    #[error("Invalid layout '{message}': {reason}")]
    LayoutError { message: String, reason: String },

    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TelemetryError {
    pub(crate) fn layout(message: &str, reason: impl Into<String>) -> Self {
        TelemetryError::LayoutError {
            message: message.to_string(),
            reason: reason.into(),
        }
    }
}

/// Leaf value of the canonical tree
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Numeric view of the scalar (booleans count as 0/1, text as nothing)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::UInt(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Scalar::Null | Scalar::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::UInt(v) => i64::try_from(*v).ok(),
            Scalar::Float(v) if v.is_finite() => Some(*v as i64),
            Scalar::Bool(v) => Some(if *v { 1 } else { 0 }),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::UInt(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{:?}", v),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(v) => serializer.serialize_bool(*v),
            Scalar::Int(v) => serializer.serialize_i64(*v),
            Scalar::UInt(v) => serializer.serialize_u64(*v),
            Scalar::Float(v) => serializer.serialize_f64(*v),
            Scalar::Text(v) => serializer.serialize_str(v),
        }
    }
}

/// Canonical tree value - the uniform representation all records are normalized into
///
/// Binary payloads always stay an explicit `Bytes` node. When written out they
/// become `{"_type": "bytes", "_data": "<base64>"}` so the tree stays text safe.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Scalar(Scalar),
    Bytes(Vec<u8>),
    Composite(Composite),
    Sequence(Vec<CanonicalValue>),
}

impl CanonicalValue {
    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            CanonicalValue::Composite(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            CanonicalValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(Scalar::as_f64)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Scalar::as_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CanonicalValue::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Base64 text of a `Bytes` node
    pub fn bytes_base64(&self) -> Option<String> {
        match self {
            CanonicalValue::Bytes(data) => Some(BASE64.encode(data)),
            _ => None,
        }
    }
}

impl From<Scalar> for CanonicalValue {
    fn from(value: Scalar) -> Self {
        CanonicalValue::Scalar(value)
    }
}

impl Serialize for CanonicalValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CanonicalValue::Scalar(s) => s.serialize(serializer),
            CanonicalValue::Bytes(data) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("_type", "bytes")?;
                map.serialize_entry("_data", &BASE64.encode(data))?;
                map.end()
            }
            CanonicalValue::Composite(c) => c.serialize(serializer),
            CanonicalValue::Sequence(items) => serializer.collect_seq(items),
        }
    }
}

/// Ordered field-name → value mapping
///
/// `skipped` names the fields that could not be read from a degraded source
/// record. They are not part of the serialized output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Composite {
    fields: Vec<(String, CanonicalValue)>,
    skipped: Vec<String>,
}

impl Composite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing an earlier value of the same name in place
    pub fn insert(&mut self, name: impl Into<String>, value: CanonicalValue) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder variant of [`Composite::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<CanonicalValue>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn mark_skipped(&mut self, name: impl Into<String>) {
        self.skipped.push(name.into());
    }

    pub fn get(&self, name: &str) -> Option<&CanonicalValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(CanonicalValue::as_f64)
    }

    pub fn get_composite(&self, name: &str) -> Option<&Composite> {
        self.get(name).and_then(CanonicalValue::as_composite)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &CanonicalValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Composite {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Source-native record time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceTime {
    /// Seconds since the epoch as a float
    Seconds(f64),
    /// Whole seconds plus nanoseconds
    SecNsec { secs: i64, nsecs: u32 },
}

impl SourceTime {
    /// Normalize to integer milliseconds: `floor(secs * 1000 + nsecs / 1e6)`.
    /// Times outside the `i64` millisecond range saturate.
    pub fn to_millis(&self) -> i64 {
        match *self {
            SourceTime::Seconds(secs) => (secs * 1000.0).floor() as i64,
            SourceTime::SecNsec { secs, nsecs } => secs
                .saturating_mul(1000)
                .saturating_add((nsecs / 1_000_000) as i64),
        }
    }

    /// Like [`SourceTime::to_millis`], but `None` when the time is not finite
    /// or does not fit in `i64` milliseconds
    pub fn checked_millis(&self) -> Option<i64> {
        match *self {
            SourceTime::Seconds(secs) => {
                let ms = (secs * 1000.0).floor();
                // i64::MAX as f64 rounds up to 2^63, which is already out of range
                (ms.is_finite() && ms >= i64::MIN as f64 && ms < i64::MAX as f64).then_some(ms as i64)
            }
            SourceTime::SecNsec { secs, nsecs } => secs
                .checked_mul(1000)
                .and_then(|ms| ms.checked_add((nsecs / 1_000_000) as i64)),
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        match *self {
            SourceTime::Seconds(secs) => secs,
            SourceTime::SecNsec { secs, nsecs } => secs as f64 + nsecs as f64 / 1e9,
        }
    }
}

/// One record produced by an extraction pass
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord {
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub topic: String,
    pub message: CanonicalValue,
}

impl Serialize for ExtractedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ExtractedRecord", 3)?;
        s.serialize_field("timestamp", &self.timestamp)?;
        s.serialize_field("topic", &self.topic)?;
        s.serialize_field("message", &self.message)?;
        s.end()
    }
}

/// A decoded signal with its current value
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    /// Signal name from the layout
    pub name: String,
    /// Physical value (`raw * factor + offset`)
    pub value: SignalValue,
    /// Engineering unit (e.g., "km/h", "°C", "V")
    pub unit: Option<String>,
    /// Label from the value table, keyed by the raw value
    pub value_description: Option<String>,
    /// Raw value before scaling
    pub raw_value: i64,
}

/// Signal value types supported by the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    /// Signed integer value
    Integer(i64),
    /// Floating-point value (after scaling/offset)
    Float(f64),
    /// Boolean value (single unscaled bit)
    Boolean(bool),
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Integer(v) => write!(f, "{}", v),
            SignalValue::Float(v) => write!(f, "{:.3}", v),
            SignalValue::Boolean(v) => write!(f, "{}", if *v { "true" } else { "false" }),
        }
    }
}

impl SignalValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            SignalValue::Integer(v) => *v as f64,
            SignalValue::Float(v) => *v,
            SignalValue::Boolean(v) => if *v { 1.0 } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_time_to_millis() {
        assert_eq!(SourceTime::Seconds(1.5).to_millis(), 1500);
        assert_eq!(SourceTime::Seconds(1.0009).to_millis(), 1000);
        assert_eq!(
            SourceTime::SecNsec { secs: 12, nsecs: 345_678_901 }.to_millis(),
            12_345
        );
        assert_eq!(SourceTime::SecNsec { secs: 0, nsecs: 999_999 }.to_millis(), 0);
        assert_eq!(SourceTime::SecNsec { secs: -2, nsecs: 500_000_000 }.to_millis(), -1_500);
    }

    #[test]
    fn test_out_of_range_time_does_not_overflow() {
        let far = SourceTime::SecNsec { secs: i64::MAX, nsecs: 0 };
        assert_eq!(far.checked_millis(), None);
        assert_eq!(far.to_millis(), i64::MAX);

        let past = SourceTime::SecNsec { secs: i64::MIN, nsecs: 999_000_000 };
        assert_eq!(past.checked_millis(), None);
        assert_eq!(past.to_millis(), i64::MIN + 999);

        assert_eq!(SourceTime::Seconds(f64::NAN).checked_millis(), None);
        assert_eq!(SourceTime::Seconds(f64::INFINITY).checked_millis(), None);
        assert_eq!(SourceTime::Seconds(1e300).checked_millis(), None);
        assert_eq!(SourceTime::Seconds(1e300).to_millis(), i64::MAX);

        let ok = SourceTime::SecNsec { secs: 1_700_000_000, nsecs: 250_000_000 };
        assert_eq!(ok.checked_millis(), Some(1_700_000_000_250));
        assert_eq!(SourceTime::Seconds(1.5).checked_millis(), Some(1_500));
    }

    #[test]
    fn test_bytes_serialize_as_tagged_base64() {
        let value = CanonicalValue::Bytes(vec![0x01, 0x02, 0xFF]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"_type": "bytes", "_data": "AQL/"}));
        assert_eq!(value.bytes_base64().as_deref(), Some("AQL/"));
        assert_eq!(CanonicalValue::from(Scalar::Int(1)).bytes_base64(), None);
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::Null.to_string(), "null");
        assert_eq!(Scalar::Int(-7).to_string(), "-7");
        assert_eq!(Scalar::UInt(7).to_string(), "7");
        assert_eq!(Scalar::Float(0.5).to_string(), "0.5");
        assert_eq!(Scalar::Text("gnss".into()).to_string(), "\"gnss\"");
    }

    #[test]
    fn test_composite_preserves_order_and_replaces() {
        let mut c = Composite::new();
        c.insert("b", Scalar::Int(1).into());
        c.insert("a", Scalar::Int(2).into());
        c.insert("b", Scalar::Int(3).into());

        let names: Vec<&str> = c.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(c.get_f64("b"), Some(3.0));

        let json = serde_json::to_string(&CanonicalValue::Composite(c)).unwrap();
        assert_eq!(json, r#"{"b":3,"a":2}"#);
    }

    #[test]
    fn test_signal_value_display() {
        assert_eq!(format!("{}", SignalValue::Integer(42)), "42");
        assert_eq!(format!("{}", SignalValue::Float(3.14159)), "3.142");
        assert_eq!(format!("{}", SignalValue::Boolean(true)), "true");
    }
}
