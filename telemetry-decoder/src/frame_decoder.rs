//! Signal Table Decoding Engine
//!
//! Normalizes a `FrameLayout` into physical-value descriptors and uses them to
//! extract signal values from concrete frame bytes. Handles bit extraction,
//! endianness, sign extension and physical value conversion.

use crate::signals::layout::{Endianness, FrameLayout, SignalField, ValueTable};
use crate::types::{DecodedSignal, Result, SignalValue, TelemetryError};
use std::collections::HashSet;

/// One contiguous run of bits within a single frame byte.
///
/// Take `num_bits` bits starting at `bit_offset` in `data[byte_index]` and
/// place them at `value_shift` in the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSpan {
    pub byte_index: usize,
    /// Lowest bit position within the byte (0..=7)
    pub bit_offset: u8,
    /// Consecutive bits in this span (1..=8)
    pub num_bits: u8,
    /// Where these bits land in the raw value, LSB-relative
    pub value_shift: u8,
}

/// Physical-value descriptor for one signal
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDescriptor {
    pub name: String,
    pub start_bit: u16,
    pub length: u16,
    pub endianness: Endianness,
    pub signed: bool,
    /// Factor as declared; see [`SignalDescriptor::scale`]
    pub factor: f64,
    pub offset: f64,
    pub unit: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Keyed by raw value, not by the scaled physical value
    pub value_table: Option<ValueTable>,
    pub comment: Option<String>,
    spans: Vec<BitSpan>,
}

impl SignalDescriptor {
    /// Frame bytes touched by this signal, in extraction order
    pub fn spans(&self) -> &[BitSpan] {
        &self.spans
    }

    /// Factor used for scaling. A declared factor of 0 reads as 1.
    pub fn scale(&self) -> f64 {
        if self.factor == 0.0 {
            1.0
        } else {
            self.factor
        }
    }

    /// Apply the linear rule `raw * factor + offset`
    pub fn physical(&self, raw: i64) -> f64 {
        self.offset + self.scale() * (raw as f64)
    }

    /// Look up the label for a raw value
    pub fn label(&self, raw: i64) -> Option<&str> {
        self.value_table
            .as_ref()
            .and_then(|table| table.get(&raw))
            .map(String::as_str)
    }

    /// Extract the raw (sign-extended when signed) value from frame data
    ///
    /// Returns `None` if the frame is shorter than the signal requires.
    pub fn extract_raw(&self, data: &[u8]) -> Option<i64> {
        let mut raw: u64 = 0;
        for span in &self.spans {
            let byte = *data.get(span.byte_index)?;
            let mask = if span.num_bits == 8 { 0xFF } else { (1u8 << span.num_bits) - 1 };
            let bits = (byte >> span.bit_offset) & mask;
            raw |= (bits as u64) << span.value_shift;
        }

        Some(if self.signed {
            FrameDecoder::sign_extend(raw, self.length as usize)
        } else {
            raw as i64
        })
    }

    /// Re-encode this descriptor as the signal definition it came from
    pub fn to_field(&self) -> SignalField {
        SignalField {
            name: self.name.clone(),
            start_bit: self.start_bit,
            length: self.length,
            factor: self.factor,
            offset: self.offset,
            unit: self.unit.clone(),
            endianness: self.endianness,
            signed: self.signed,
            min: self.min,
            max: self.max,
            val_table: self.value_table.clone(),
            comment: self.comment.clone(),
        }
    }
}

/// A validated frame layout ready to decode frame instances
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub id: u32,
    pub name: String,
    pub length: usize,
    pub sender: Option<String>,
    pub cycle_time: Option<u32>,
    pub signals: Vec<SignalDescriptor>,
}

impl DecodedFrame {
    pub fn signal(&self, name: &str) -> Option<&SignalDescriptor> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// Decode every signal of a concrete frame
    ///
    /// Signals that do not fit in `data` are skipped with a warning.
    pub fn decode_payload(&self, data: &[u8]) -> Vec<DecodedSignal> {
        self.signals
            .iter()
            .filter_map(|signal| {
                let decoded = FrameDecoder::decode_signal(data, signal);
                if decoded.is_none() {
                    log::warn!(
                        "Signal '{}' of frame {} does not fit in {} data bytes",
                        signal.name,
                        self.name,
                        data.len()
                    );
                }
                decoded
            })
            .collect()
    }

    /// Re-encode the layout this frame was decoded from
    pub fn to_layout(&self) -> FrameLayout {
        FrameLayout {
            id: self.id,
            name: self.name.clone(),
            length: self.length,
            signals: self.signals.iter().map(SignalDescriptor::to_field).collect(),
            sender: self.sender.clone(),
            cycle_time: self.cycle_time,
        }
    }
}

/// Frame decoder - validates layouts and extracts signals
pub struct FrameDecoder;

impl FrameDecoder {
    /// Validate a layout and build its physical-value descriptors
    ///
    /// Fails with `LayoutError` when a signal's bit span leaves the frame, when a
    /// length is outside 1..=64, or when a signal name is declared twice. No
    /// partial result is returned.
    pub fn decode(layout: &FrameLayout) -> Result<DecodedFrame> {
        let mut seen = HashSet::new();
        let mut signals = Vec::with_capacity(layout.signals.len());

        for field in &layout.signals {
            if !seen.insert(field.name.as_str()) {
                return Err(TelemetryError::layout(
                    &layout.name,
                    format!("duplicate signal name '{}'", field.name),
                ));
            }
            if field.length == 0 || field.length > 64 {
                return Err(TelemetryError::layout(
                    &layout.name,
                    format!("signal '{}' has invalid length {}", field.name, field.length),
                ));
            }

            let spans = Self::bit_spans(field.start_bit, field.length, field.endianness);
            if spans.iter().any(|span| span.byte_index >= layout.length) {
                return Err(TelemetryError::layout(
                    &layout.name,
                    format!(
                        "signal '{}' (start {}, length {}) exceeds frame capacity of {} bits",
                        field.name,
                        field.start_bit,
                        field.length,
                        layout.length * 8
                    ),
                ));
            }

            signals.push(SignalDescriptor {
                name: field.name.clone(),
                start_bit: field.start_bit,
                length: field.length,
                endianness: field.endianness,
                signed: field.signed,
                factor: field.factor,
                offset: field.offset,
                unit: field.unit.clone(),
                min: field.min,
                max: field.max,
                value_table: field.val_table.clone(),
                comment: field.comment.clone(),
                spans,
            });
        }

        log::debug!("Decoded layout {} (0x{:X}): {} signals", layout.name, layout.id, signals.len());

        Ok(DecodedFrame {
            id: layout.id,
            name: layout.name.clone(),
            length: layout.length,
            sender: layout.sender.clone(),
            cycle_time: layout.cycle_time,
            signals,
        })
    }

    /// Map a signal's start bit and byte order to per-byte bit spans
    ///
    /// Little-endian: the start bit is the LSB; walk upward through each byte,
    /// then continue at bit 0 of the next byte.
    /// Big-endian: the start bit is the MSB; walk downward through each byte,
    /// then continue at bit 7 of the next byte.
    pub fn bit_spans(start_bit: u16, length: u16, endianness: Endianness) -> Vec<BitSpan> {
        let mut spans = Vec::new();
        let mut byte_index = (start_bit / 8) as usize;
        let mut bit_index = (start_bit % 8) as u8;
        let mut remaining = length;

        match endianness {
            Endianness::Big => {
                while remaining > 0 {
                    let num_bits = std::cmp::min(bit_index as u16 + 1, remaining) as u8;
                    let bit_offset = bit_index + 1 - num_bits;
                    remaining -= num_bits as u16;
                    spans.push(BitSpan {
                        byte_index,
                        bit_offset,
                        num_bits,
                        value_shift: remaining as u8,
                    });
                    byte_index += 1;
                    bit_index = 7;
                }
            }
            Endianness::Little => {
                let mut value_shift: u16 = 0;
                while remaining > 0 {
                    let num_bits = std::cmp::min(8 - bit_index as u16, remaining) as u8;
                    spans.push(BitSpan {
                        byte_index,
                        bit_offset: bit_index,
                        num_bits,
                        value_shift: value_shift as u8,
                    });
                    value_shift += num_bits as u16;
                    remaining -= num_bits as u16;
                    byte_index += 1;
                    bit_index = 0;
                }
            }
        }

        spans
    }

    /// Decode a single signal from frame data
    fn decode_signal(data: &[u8], signal: &SignalDescriptor) -> Option<DecodedSignal> {
        let raw_value = signal.extract_raw(data)?;
        let physical_value = signal.physical(raw_value);
        let scale = signal.scale();

        let value = if scale == 1.0 && signal.offset == 0.0 && signal.length == 1 {
            // Boolean signal (single bit, no scaling)
            SignalValue::Boolean(raw_value != 0)
        } else if scale != 1.0 || signal.offset != 0.0 {
            SignalValue::Float(physical_value)
        } else {
            SignalValue::Integer(raw_value)
        };

        Some(DecodedSignal {
            name: signal.name.clone(),
            value,
            unit: if signal.unit.is_empty() { None } else { Some(signal.unit.clone()) },
            value_description: signal.label(raw_value).map(str::to_string),
            raw_value,
        })
    }

    /// Sign-extend a value from N bits to 64 bits
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            value as i64
        }
    }
}
