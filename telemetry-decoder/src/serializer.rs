//! Message tree serializer
//!
//! Walks a `Record` depth-first and emits the canonical tree. No schema is
//! needed: the shape of the record decides the shape of the output.

use crate::record::Record;
use crate::types::{CanonicalValue, Composite, Scalar};

/// Convert a record into its canonical tree
///
/// Never fails. Message fields that cannot be read are left out of the
/// resulting `Composite` and listed in its `skipped` names.
pub fn serialize(record: &Record) -> CanonicalValue {
    match record {
        Record::Bytes(data) => CanonicalValue::Bytes(data.clone()),
        Record::Message(fields) => {
            let mut composite = Composite::new();
            for field in fields {
                match &field.value {
                    Ok(value) => composite.insert(field.name.clone(), serialize(value)),
                    Err(e) => {
                        log::trace!("Omitting field: {}", e);
                        composite.mark_skipped(field.name.clone());
                    }
                }
            }
            CanonicalValue::Composite(composite)
        }
        Record::List(items) => CanonicalValue::Sequence(items.iter().map(serialize).collect()),
        Record::Map(entries) => {
            let mut composite = Composite::new();
            for (key, value) in entries {
                composite.insert(key.clone(), serialize(value));
            }
            CanonicalValue::Composite(composite)
        }
        Record::Null => CanonicalValue::Scalar(Scalar::Null),
        Record::Bool(v) => CanonicalValue::Scalar(Scalar::Bool(*v)),
        Record::Int(v) => CanonicalValue::Scalar(Scalar::Int(*v)),
        Record::UInt(v) => CanonicalValue::Scalar(Scalar::UInt(*v)),
        Record::Float(v) => CanonicalValue::Scalar(Scalar::Float(*v)),
        Record::Text(v) => CanonicalValue::Scalar(Scalar::Text(v.clone())),
    }
}
