//! DBC file parser
//!
//! Parses Vector DBC files and converts them into frame layouts.

use crate::signals::layout::{Endianness, FrameLayout, SignalField, ValueTable};
use crate::types::{Result, TelemetryError};
use std::path::Path;

/// Placeholder node name DBC tools write when a frame has no sender
const NO_SENDER: &str = "Vector__XXX";

/// Extended-frame flag carried in the DBC message id
const EXTENDED_ID_FLAG: u32 = 0x8000_0000;

/// Parse a DBC file and return its frame layouts
pub fn parse_dbc_file(path: &Path) -> Result<Vec<FrameLayout>> {
    log::info!("Parsing DBC file: {:?}", path);

    if !path.exists() {
        return Err(TelemetryError::SourceNotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path).map_err(|e| {
        TelemetryError::DbcParseError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    // Try UTF-8 first, then fall back to Latin-1 (compatible with Windows-1252)
    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("DBC file is not UTF-8, trying Latin-1 encoding");
            e.into_bytes().iter().map(|&b| b as char).collect()
        }
    };

    let layouts = parse_dbc_str(&content)?;
    log::info!("Parsed {} messages from {:?}", layouts.len(), path);
    Ok(layouts)
}

/// Parse DBC text into frame layouts
pub fn parse_dbc_str(content: &str) -> Result<Vec<FrameLayout>> {
    let dbc = can_dbc::DBC::from_slice(content.as_bytes())
        .map_err(|e| TelemetryError::DbcParseError(format!("{:?}", e)))?;

    Ok(dbc
        .messages()
        .iter()
        .map(|msg| convert_message(&dbc, msg))
        .collect())
}

/// Convert a can-dbc message to a FrameLayout
fn convert_message(dbc: &can_dbc::DBC, dbc_msg: &can_dbc::Message) -> FrameLayout {
    let raw_id = dbc_msg.message_id().0;

    let signals = dbc_msg
        .signals()
        .iter()
        .map(|sig| convert_signal(dbc, raw_id, sig))
        .collect();

    let sender = match dbc_msg.transmitter() {
        can_dbc::Transmitter::NodeName(name) if name != NO_SENDER => Some(name.to_string()),
        _ => None,
    };

    FrameLayout {
        id: raw_id & !EXTENDED_ID_FLAG,
        name: dbc_msg.message_name().to_string(),
        length: *dbc_msg.message_size() as usize,
        signals,
        sender,
        cycle_time: cycle_time(dbc, dbc_msg.message_id()),
    }
}

/// `GenMsgCycleTime` attribute of a message, in milliseconds. Zero means unset.
fn cycle_time(dbc: &can_dbc::DBC, message_id: &can_dbc::MessageId) -> Option<u32> {
    use can_dbc::{AttributeValue, AttributeValuedForObjectType};

    dbc.attribute_values()
        .iter()
        .filter(|attr| attr.attribute_name() == "GenMsgCycleTime")
        .find_map(|attr| match attr.attribute_value() {
            AttributeValuedForObjectType::MessageDefinitionAttributeValue(id, Some(value)) if id == message_id => {
                match value {
                    AttributeValue::AttributeValueF64(v) => Some(*v),
                    AttributeValue::AttributeValueU64(v) => Some(*v as f64),
                    AttributeValue::AttributeValueI64(v) => Some(*v as f64),
                    AttributeValue::AttributeValueCharString(_) => None,
                }
            }
            _ => None,
        })
        .filter(|&ms| ms > 0.0 && ms <= u32::MAX as f64)
        .map(|ms| ms as u32)
}

/// Convert a can-dbc signal to a SignalField
fn convert_signal(dbc: &can_dbc::DBC, raw_id: u32, dbc_sig: &can_dbc::Signal) -> SignalField {
    let endianness = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => Endianness::Little,
        can_dbc::ByteOrder::BigEndian => Endianness::Big,
    };

    let message_id = can_dbc::MessageId(raw_id);

    let val_table = dbc
        .value_descriptions_for_signal(message_id, dbc_sig.name())
        .filter(|descriptions| !descriptions.is_empty())
        .map(|descriptions| {
            descriptions
                .iter()
                .map(|d| (*d.a() as i64, d.b().to_string()))
                .collect::<ValueTable>()
        });

    // A [0|0] range means "no bounds declared"
    let (min, max) = if *dbc_sig.min() == 0.0 && *dbc_sig.max() == 0.0 {
        (None, None)
    } else {
        (Some(*dbc_sig.min()), Some(*dbc_sig.max()))
    };

    SignalField {
        name: dbc_sig.name().to_string(),
        start_bit: *dbc_sig.start_bit() as u16,
        length: *dbc_sig.signal_size() as u16,
        factor: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        unit: dbc_sig.unit().to_string(),
        endianness,
        signed: matches!(*dbc_sig.value_type(), can_dbc::ValueType::Signed),
        min,
        max,
        val_table,
        comment: dbc
            .signal_comment(message_id, dbc_sig.name())
            .filter(|c| !c.is_empty())
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DBC: &str = r#"
VERSION ""

NS_ :
    NS_DESC_
    CM_
    BA_DEF_
    BA_
    VAL_

BS_:

BU_: ECU1 ECU2

BO_ 291 EngineData: 8 ECU1
 SG_ EngineSpeed : 0|16@1+ (1,0) [0|8000] "rpm" ECU2
 SG_ EngineTemp : 16|8@1+ (1,-40) [-40|215] "C" ECU2
 SG_ GearState : 24|2@1+ (1,0) [0|0] "" ECU2

BO_ 512 BatteryStatus: 8 Vector__XXX
 SG_ BatteryVoltage : 7|16@0+ (0.01,0) [0|16] "V" ECU2
 SG_ BatteryCurrent : 23|16@0- (0.1,0) [-3276.8|3276.7] "A" ECU2

CM_ SG_ 291 EngineTemp "Coolant temperature";
BA_DEF_ BO_ "GenMsgCycleTime" INT 0 10000;
BA_ "GenMsgCycleTime" BO_ 291 100;
VAL_ 291 GearState 0 "Park" 1 "Reverse" 2 "Drive" ;
"#;

    #[test]
    fn test_parse_simple_dbc() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(DBC.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let layouts = parse_dbc_file(temp_file.path()).unwrap();
        assert_eq!(layouts.len(), 2);

        let engine = &layouts[0];
        assert_eq!(engine.id, 291);
        assert_eq!(engine.name, "EngineData");
        assert_eq!(engine.length, 8);
        assert_eq!(engine.sender.as_deref(), Some("ECU1"));
        assert_eq!(engine.cycle_time, Some(100));
        assert_eq!(engine.signals.len(), 3);

        let speed = &engine.signals[0];
        assert_eq!(speed.name, "EngineSpeed");
        assert_eq!(speed.start_bit, 0);
        assert_eq!(speed.length, 16);
        assert_eq!(speed.endianness, Endianness::Little);
        assert_eq!(speed.unit, "rpm");
        assert_eq!(speed.max, Some(8000.0));

        let temp = &engine.signals[1];
        assert_eq!(temp.offset, -40.0);
        assert_eq!(temp.comment.as_deref(), Some("Coolant temperature"));

        let gear = &engine.signals[2];
        assert_eq!(gear.min, None);
        let table = gear.val_table.as_ref().unwrap();
        assert_eq!(table.get(&2).map(String::as_str), Some("Drive"));
    }

    #[test]
    fn test_big_endian_and_signed() {
        let layouts = parse_dbc_str(DBC).unwrap();
        let battery = &layouts[1];
        assert_eq!(battery.sender, None);
        assert_eq!(battery.cycle_time, None);

        let voltage = &battery.signals[0];
        assert_eq!(voltage.endianness, Endianness::Big);
        assert!(!voltage.signed);
        assert_eq!(voltage.factor, 0.01);

        let current = &battery.signals[1];
        assert!(current.signed);

        // Every parsed layout must validate
        for layout in &layouts {
            assert!(layout.decode().is_ok(), "layout {} failed", layout.name);
        }
    }

    #[test]
    fn test_missing_dbc_file() {
        let result = parse_dbc_file(Path::new("missing.dbc"));
        assert!(matches!(result, Err(TelemetryError::SourceNotFound(_))));
    }

    #[test]
    fn test_cycle_time_with_irregular_spacing() {
        let dbc = r#"
VERSION ""

NS_ :
    BA_DEF_
    BA_

BS_:

BU_: ECU1

BO_ 291 EngineData: 8 ECU1
 SG_ EngineSpeed : 0|16@1+ (1,0) [0|8000] "rpm" ECU1

BO_ 2147484672 ExtendedData: 8 ECU1
 SG_ Counter : 0|8@1+ (0,0) [0|0] "" ECU1

BA_DEF_ BO_ "GenMsgCycleTime" INT 0 10000;
BA_  "GenMsgCycleTime"  BO_ 291 100;
BA_ "GenMsgCycleTime"   BO_  2147484672  20;
"#;
        let layouts = parse_dbc_str(dbc).unwrap();
        assert_eq!(layouts[0].cycle_time, Some(100));
        assert_eq!(layouts[1].id, 1024);
        assert_eq!(layouts[1].cycle_time, Some(20));

        // Declared factor is kept; the decoder reads zero as one
        assert_eq!(layouts[1].signals[0].factor, 0.0);
    }
}
