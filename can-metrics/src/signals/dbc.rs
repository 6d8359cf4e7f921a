//! DBC text parser
//!
//! Parses Vector DBC text with the `can-dbc` crate and converts it into our
//! internal message definitions. Model-level validation lives in
//! [`DbcModel::from_messages`](crate::signals::DbcModel::from_messages).

use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
use crate::types::{MetricsError, Result};

/// Flag bit marking an extended (29-bit) ID in DBC message IDs
const EXTENDED_ID_FLAG: u32 = 0x8000_0000;
const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Decode DBC file bytes, falling back to Latin-1 for non-UTF-8 files
///
/// Many vendor DBC files are written in Windows-1252, which is
/// byte-compatible with Latin-1 for the printable range.
pub fn decode_dbc_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("DBC text is not UTF-8, trying Latin-1 encoding");
            err.into_bytes().iter().map(|&b| b as char).collect()
        }
    }
}

/// Parse DBC text and return message definitions in declaration order
pub fn parse_dbc_str(dbc_text: &str) -> Result<Vec<MessageDefinition>> {
    let dbc = can_dbc::DBC::from_slice(dbc_text.as_bytes())
        .map_err(|e| MetricsError::Parse(format!("Malformed DBC: {:?}", e)))?;

    let messages = dbc
        .messages()
        .iter()
        .map(convert_message)
        .collect::<Result<Vec<_>>>()?;

    log::info!("Parsed {} messages from DBC", messages.len());
    Ok(messages)
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(dbc_msg: &can_dbc::Message) -> Result<MessageDefinition> {
    let raw_id = dbc_msg.message_id().0;
    let id = if raw_id & EXTENDED_ID_FLAG != 0 {
        raw_id & EXTENDED_ID_MASK
    } else {
        raw_id
    };

    let multiplexer_signal = dbc_msg
        .signals()
        .iter()
        .find(|sig| {
            matches!(
                sig.multiplexer_indicator(),
                can_dbc::MultiplexIndicator::Multiplexor
            )
        })
        .map(|sig| sig.name().to_string());

    let signals = dbc_msg
        .signals()
        .iter()
        .map(|sig| convert_signal(dbc_msg, sig))
        .collect::<Result<Vec<_>>>()?;

    Ok(MessageDefinition {
        id,
        name: dbc_msg.message_name().to_string(),
        size: *dbc_msg.message_size() as usize,
        sender: match dbc_msg.transmitter() {
            can_dbc::Transmitter::NodeName(name) => Some(name.to_string()),
            _ => None,
        },
        signals,
        multiplexer_signal,
    })
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(dbc_msg: &can_dbc::Message, dbc_sig: &can_dbc::Signal) -> Result<SignalDefinition> {
    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    let (is_multiplexer, multiplex_value) = match *dbc_sig.multiplexer_indicator() {
        can_dbc::MultiplexIndicator::Multiplexor => (true, None),
        can_dbc::MultiplexIndicator::MultiplexedSignal(switch_value) => (false, Some(switch_value)),
        // Nested switch; rejected when the model is validated
        can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(switch_value) => {
            (true, Some(switch_value))
        }
        can_dbc::MultiplexIndicator::Plain => (false, None),
    };

    let start_bit = u16::try_from(*dbc_sig.start_bit()).map_err(|_| {
        MetricsError::Parse(format!(
            "Signal '{}' in message '{}' has out-of-range start bit {}",
            dbc_sig.name(),
            dbc_msg.message_name(),
            dbc_sig.start_bit()
        ))
    })?;
    let length = u16::try_from(*dbc_sig.signal_size()).map_err(|_| {
        MetricsError::Parse(format!(
            "Signal '{}' in message '{}' has out-of-range length {}",
            dbc_sig.name(),
            dbc_msg.message_name(),
            dbc_sig.signal_size()
        ))
    })?;

    Ok(SignalDefinition {
        name: dbc_sig.name().to_string(),
        public_name: dbc_sig.name().to_string(),
        start_bit,
        length,
        byte_order,
        value_type,
        factor: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        min: *dbc_sig.min(),
        max: *dbc_sig.max(),
        unit: dbc_sig.unit().to_string(),
        is_multiplexer,
        multiplex_value,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::signals::DbcModel;

    pub(crate) const EV_DBC: &str = r#"
VERSION ""

NS_ :
    NS_DESC_
    CM_
    BA_DEF_
    BA_
    VAL_
    SIG_VALTYPE_

BS_:

BU_: BMS VCU

BO_ 291 BatteryStatus: 8 BMS
 SG_ BatterySOC : 0|8@1+ (0.5,0) [0|100] "%" VCU
 SG_ BatteryVoltage : 8|16@1+ (0.1,0) [0|800] "V" VCU
 SG_ BatteryCurrent : 24|16@1- (0.1,0) [-3276.8|3276.7] "A" VCU
 SG_ BatteryTemp : 40|8@1+ (1,-40) [-40|215] "degC" VCU

BO_ 512 MotorStatus: 8 VCU
 SG_ MotorRpm : 7|16@0+ (1,0) [0|20000] "rpm" BMS
 SG_ MotorTorque : 23|16@0- (0.1,0) [-3276.8|3276.7] "Nm" BMS

BO_ 1024 DiagMux: 8 VCU
 SG_ Page M : 0|8@1+ (1,0) [0|3] "" BMS
 SG_ CellVoltageMin m0 : 8|16@1+ (0.001,0) [0|5] "V" BMS
 SG_ CellTempMax m1 : 8|8@1+ (1,-40) [-40|215] "degC" BMS
"#;

    #[test]
    fn test_parse_simple_dbc() {
        let messages = parse_dbc_str(EV_DBC).unwrap();
        assert_eq!(messages.len(), 3);

        let msg1 = &messages[0];
        assert_eq!(msg1.id, 291);
        assert_eq!(msg1.name, "BatteryStatus");
        assert_eq!(msg1.size, 8);
        assert_eq!(msg1.sender, Some("BMS".to_string()));
        assert_eq!(msg1.signals.len(), 4);

        let soc = &msg1.signals[0];
        assert_eq!(soc.name, "BatterySOC");
        assert_eq!(soc.start_bit, 0);
        assert_eq!(soc.length, 8);
        assert_eq!(soc.factor, 0.5);
        assert_eq!(soc.unit, "%");

        let current = &msg1.signals[2];
        assert_eq!(current.value_type, ValueType::Signed);

        let rpm = &messages[1].signals[0];
        assert_eq!(rpm.byte_order, ByteOrder::BigEndian);
    }

    #[test]
    fn test_parse_multiplexed_signals() {
        let messages = parse_dbc_str(EV_DBC).unwrap();
        let msg = messages.iter().find(|m| m.id == 1024).unwrap();
        assert!(msg.is_multiplexed());
        assert_eq!(msg.multiplexer_signal, Some("Page".to_string()));

        let cell_v = msg.signals.iter().find(|s| s.name == "CellVoltageMin").unwrap();
        assert_eq!(cell_v.multiplex_value, Some(0));
        let page = msg.signals.iter().find(|s| s.name == "Page").unwrap();
        assert!(page.is_multiplexer);
    }

    #[test]
    fn test_load_lookup_every_message() {
        let model = DbcModel::load(EV_DBC).unwrap();
        let expected = [(291u32, 4usize), (512, 2), (1024, 3)];
        for (id, count) in expected {
            let msg = model.lookup_message(id).unwrap();
            assert_eq!(msg.signals.len(), count, "message 0x{:X}", id);
        }
        assert_eq!(model.stats().num_multiplexed, 1);
    }

    #[test]
    fn test_load_is_deterministic() {
        let a = DbcModel::load(EV_DBC).unwrap();
        let b = DbcModel::load(EV_DBC).unwrap();
        assert_eq!(a, b);
        let ids: Vec<u32> = a.messages().map(|m| m.id).collect();
        assert_eq!(ids, vec![291, 512, 1024]);
    }

    #[test]
    fn test_extended_id_flag_stripped() {
        let text = r#"
VERSION ""

NS_ :

BS_:

BU_: ECU

BO_ 2566848512 ExtendedMsg: 8 ECU
 SG_ ChargePower : 0|16@1+ (0.01,0) [0|655.35] "kW" ECU
"#;
        let model = DbcModel::load(text).unwrap();
        // 2566848512 = 0x98FF_0000 -> 0x18FF_0000 once the flag is removed
        assert!(model.lookup_message(0x18FF_0000).is_some());
        assert!(model.lookup_message(0x98FF_0000).is_none());
        assert_eq!(model.stats().num_messages, 1);
    }

    const NESTED_MUX_DBC: &str = r#"
VERSION ""

NS_ :

BS_:

BU_: ECU

BO_ 1536 NestedMux: 8 ECU
 SG_ Outer M : 0|8@1+ (1,0) [0|255] "" ECU
 SG_ Inner m1M : 8|8@1+ (1,0) [0|255] "" ECU
 SG_ Deep m5 : 16|8@1+ (1,0) [0|255] "" ECU
"#;

    #[test]
    fn test_nested_switch_keeps_its_switch_value() {
        let messages = parse_dbc_str(NESTED_MUX_DBC).unwrap();
        let msg = &messages[0];
        assert_eq!(msg.multiplexer_signal, Some("Outer".to_string()));

        let inner = msg.signals.iter().find(|s| s.name == "Inner").unwrap();
        assert!(inner.is_multiplexer);
        assert_eq!(inner.multiplex_value, Some(1));
    }

    #[test]
    fn test_nested_multiplexing_rejected() {
        match DbcModel::load(NESTED_MUX_DBC) {
            Err(MetricsError::Parse(msg)) => assert!(msg.contains("Inner"), "{}", msg),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_signal_exceeding_message_rejected() {
        let text = r#"
VERSION ""

NS_ :

BS_:

BU_: ECU

BO_ 100 Tiny: 2 ECU
 SG_ TooWide : 8|16@1+ (1,0) [0|65535] "" ECU
"#;
        assert!(matches!(DbcModel::load(text), Err(MetricsError::Parse(_))));
    }

    #[test]
    fn test_multiplexed_signal_without_multiplexer_rejected() {
        let text = r#"
VERSION ""

NS_ :

BS_:

BU_: ECU

BO_ 100 Orphan: 8 ECU
 SG_ Lonely m3 : 8|8@1+ (1,0) [0|255] "" ECU
"#;
        assert!(matches!(DbcModel::load(text), Err(MetricsError::Parse(_))));
    }

    #[test]
    fn test_malformed_dbc_rejected() {
        let text = "VERSION \"\"\n\nBO_ 100 Broken: 8\n SG_ Half : 0|";
        assert!(matches!(DbcModel::load(text), Err(MetricsError::Parse(_))));
    }

    #[test]
    fn test_latin1_fallback() {
        let bytes = b"Temp \xb0C".to_vec();
        assert_eq!(decode_dbc_bytes(bytes), "Temp °C");
    }
}
