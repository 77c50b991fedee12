//! Frame layout data model
//!
//! A `FrameLayout` describes one fixed-size frame: its identifier, byte length
//! and the signals packed into it. A `LayoutDocument` is the JSON form of a
//! whole set of layouts plus the value tables shared by signal name.

use crate::frame_decoder::{DecodedFrame, FrameDecoder};
use crate::types::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Raw integer → label mapping
pub type ValueTable = BTreeMap<i64, String>;

/// Bit order of a signal within its frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Motorola: start bit is the MSB, bits run most-significant first
    Big,
    /// Intel: start bit is the LSB, bits run least-significant first
    Little,
}

/// One named bit-field within a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalField {
    pub name: String,
    pub start_bit: u16,
    pub length: u16,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub unit: String,
    pub endianness: Endianness,
    #[serde(default, skip_serializing_if = "is_false")]
    pub signed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_table: Option<ValueTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_factor() -> f64 {
    1.0
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl SignalField {
    /// Unsigned, unscaled field
    pub fn new(name: impl Into<String>, start_bit: u16, length: u16, endianness: Endianness) -> Self {
        Self {
            name: name.into(),
            start_bit,
            length,
            factor: 1.0,
            offset: 0.0,
            unit: String::new(),
            endianness,
            signed: false,
            min: None,
            max: None,
            val_table: None,
            comment: None,
        }
    }

    pub fn with_scaling(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    pub fn with_value_table(mut self, table: ValueTable) -> Self {
        self.val_table = Some(table);
        self
    }
}

/// A complete frame definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameLayout {
    /// Frame identifier (CAN ID without the extended-frame flag)
    pub id: u32,
    pub name: String,
    /// Frame size in bytes
    pub length: usize,
    pub signals: Vec<SignalField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Transmission period in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_time: Option<u32>,
}

impl FrameLayout {
    pub fn new(id: u32, name: impl Into<String>, length: usize) -> Self {
        Self {
            id,
            name: name.into(),
            length,
            signals: Vec::new(),
            sender: None,
            cycle_time: None,
        }
    }

    pub fn with_signal(mut self, signal: SignalField) -> Self {
        self.signals.push(signal);
        self
    }

    /// Validate and normalize this layout into physical-value descriptors
    pub fn decode(&self) -> Result<DecodedFrame> {
        FrameDecoder::decode(self)
    }
}

/// JSON document holding a set of layouts
///
/// Shape: `{ "messages": [...], "valTables": { signalName: { rawCode: label } } }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    pub messages: Vec<FrameLayout>,
    #[serde(default)]
    pub val_tables: BTreeMap<String, ValueTable>,
}

impl LayoutDocument {
    /// Build a document, collecting every signal's value table by signal name
    ///
    /// When several frames carry a signal of the same name, the last table wins.
    pub fn from_layouts(messages: Vec<FrameLayout>) -> Self {
        let mut val_tables = BTreeMap::new();
        for signal in messages.iter().flat_map(|m| m.signals.iter()) {
            if let Some(table) = &signal.val_table {
                val_tables.insert(signal.name.clone(), table.clone());
            }
        }
        Self {
            messages,
            val_tables,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a document from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TelemetryError::SourceNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the document as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        log::info!("Wrote {} layouts to {:?}", self.messages.len(), path);
        Ok(())
    }

    /// Decode every layout independently
    ///
    /// A malformed layout yields an error in its own slot; the others still decode.
    pub fn decode_all(&self) -> Vec<Result<DecodedFrame>> {
        self.messages
            .iter()
            .map(|layout| {
                let decoded = layout.decode();
                if let Err(e) = &decoded {
                    log::warn!("Skipping layout {} (0x{:X}): {}", layout.name, layout.id, e);
                }
                decoded
            })
            .collect()
    }
}
