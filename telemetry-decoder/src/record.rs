//! Self-describing source records
//!
//! `Record` is the closed set of shapes a recorded telemetry message can take
//! before normalization. A message's field slot may hold a `FieldAccessError`
//! when the value could not be read from a degraded or partial record.

use crate::types::{CanonicalValue, Scalar};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

/// Type tag marking an encoded binary payload in JSON input and output
pub const BYTES_TYPE_TAG: &str = "bytes";

/// A field whose value could not be read
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("field '{field}' is unreadable: {reason}")]
pub struct FieldAccessError {
    pub field: String,
    pub reason: String,
}

/// One named field slot of a message
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Result<Record, FieldAccessError>,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Record) -> Self {
        Self {
            name: name.into(),
            value: Ok(value),
        }
    }

    pub fn unreadable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            value: Err(FieldAccessError {
                field: name.clone(),
                reason: reason.into(),
            }),
            name,
        }
    }
}

/// An opaque, self-describing telemetry record
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    /// Raw binary payload
    Bytes(Vec<u8>),
    /// Named fields in declaration order
    Message(Vec<Field>),
    /// Ordered collection
    List(Vec<Record>),
    /// Key-value mapping
    Map(Vec<(String, Record)>),
}

impl Record {
    /// Build a message from readable `(name, value)` pairs
    pub fn message<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Record)>,
        S: Into<String>,
    {
        Record::Message(fields.into_iter().map(|(n, v)| Field::new(n, v)).collect())
    }

    /// Convert a JSON value into a record
    ///
    /// Objects become messages with their key order preserved. Objects of the
    /// form `{"_type": "bytes", "_data": "<base64>"}` become `Bytes`. When such
    /// a payload fails to decode inside a message, that field is unreadable.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Record::Null,
            Value::Bool(b) => Record::Bool(b),
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Record::Int(v)
                } else if let Some(v) = n.as_u64() {
                    Record::UInt(v)
                } else {
                    Record::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Record::Text(s),
            Value::Array(items) => Record::List(items.into_iter().map(Record::from_json).collect()),
            Value::Object(map) => match decode_tagged_bytes(&map) {
                Some(Ok(bytes)) => Record::Bytes(bytes),
                _ => Record::Message(
                    map.into_iter()
                        .map(|(name, v)| Self::field_from_json(name, v))
                        .collect(),
                ),
            },
        }
    }

    fn field_from_json(name: String, value: Value) -> Field {
        if let Value::Object(map) = &value {
            if let Some(Err(reason)) = decode_tagged_bytes(map) {
                log::debug!("Field '{}' carries an undecodable byte payload: {}", name, reason);
                return Field::unreadable(name, reason);
            }
        }
        Field::new(name, Record::from_json(value))
    }
}

/// `None` when the object is not a tagged byte payload
fn decode_tagged_bytes(map: &serde_json::Map<String, Value>) -> Option<Result<Vec<u8>, String>> {
    if map.len() != 2 || map.get("_type").and_then(Value::as_str) != Some(BYTES_TYPE_TAG) {
        return None;
    }
    let data = map.get("_data")?.as_str()?;
    Some(BASE64.decode(data).map_err(|e| format!("invalid base64 payload: {}", e)))
}

impl From<&Scalar> for Record {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Null => Record::Null,
            Scalar::Bool(v) => Record::Bool(*v),
            Scalar::Int(v) => Record::Int(*v),
            Scalar::UInt(v) => Record::UInt(*v),
            Scalar::Float(v) => Record::Float(*v),
            Scalar::Text(v) => Record::Text(v.clone()),
        }
    }
}

/// View a canonical tree as a record again
///
/// Skipped field names come back as unreadable slots, so serializing the
/// result reproduces the same tree.
impl From<&CanonicalValue> for Record {
    fn from(value: &CanonicalValue) -> Self {
        match value {
            CanonicalValue::Scalar(s) => Record::from(s),
            CanonicalValue::Bytes(data) => Record::Bytes(data.clone()),
            CanonicalValue::Sequence(items) => Record::List(items.iter().map(Record::from).collect()),
            CanonicalValue::Composite(c) => {
                let mut fields: Vec<Field> = c
                    .fields()
                    .map(|(name, v)| Field::new(name, Record::from(v)))
                    .collect();
                fields.extend(
                    c.skipped()
                        .iter()
                        .map(|name| Field::unreadable(name.clone(), "skipped in an earlier conversion")),
                );
                Record::Message(fields)
            }
        }
    }
}
