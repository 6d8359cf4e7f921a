//! In-memory DBC model
//!
//! Holds the message and signal layouts of one protocol family. A model is
//! built once at load time, validated as a whole, and never mutated after.

use crate::types::{MetricsError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    /// CAN arbitration ID (extended-frame flag stripped)
    pub id: u32,
    /// Message name
    pub name: String,
    /// Message size in bytes
    pub size: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// All signals in this message, in declaration order
    pub signals: Vec<SignalDefinition>,
    /// Multiplexer signal name (if multiplexed)
    pub multiplexer_signal: Option<String>,
}

impl MessageDefinition {
    /// True if this message carries a multiplexer switch
    pub fn is_multiplexed(&self) -> bool {
        self.multiplexer_signal.is_some()
    }

    /// The multiplexer switch signal, if any
    pub fn multiplexer(&self) -> Option<&SignalDefinition> {
        let name = self.multiplexer_signal.as_deref()?;
        self.signals.iter().find(|s| s.name == name)
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    /// Signal name as declared in the DBC
    pub name: String,
    /// Name exposed to callers; differs from `name` only on cross-message collisions
    pub public_name: String,
    /// Start bit in the CAN frame (LSB for Intel, MSB for Motorola)
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value
    pub min: f64,
    /// Maximum physical value
    pub max: f64,
    /// Engineering unit; empty when the DBC declares none
    pub unit: String,
    /// True for the message's multiplexer switch signal
    pub is_multiplexer: bool,
    /// Switch value for which this signal is present (None = always present)
    pub multiplex_value: Option<u64>,
}

impl SignalDefinition {
    /// Number of payload bytes needed to hold this signal's bit span
    ///
    /// Motorola signals use sawtooth numbering: the start bit is the MSB and
    /// the span continues at bit 7 of the following byte.
    pub fn required_bytes(&self) -> usize {
        let start = self.start_bit as usize;
        let length = self.length as usize;
        match self.byte_order {
            ByteOrder::LittleEndian => (start + length + 7) / 8,
            ByteOrder::BigEndian => {
                let msb_byte = start / 8;
                let bits_in_first = start % 8 + 1;
                if length <= bits_in_first {
                    msb_byte + 1
                } else {
                    msb_byte + 1 + (length - bits_in_first + 7) / 8
                }
            }
        }
    }
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Signed,
    Unsigned,
}

/// Parsed DBC model for one protocol/vehicle family
#[derive(Debug, Clone, PartialEq)]
pub struct DbcModel {
    /// All message definitions by arbitration ID
    messages: BTreeMap<u32, MessageDefinition>,

    /// Public signal name -> (arbitration ID, signal index)
    signal_lookup: HashMap<String, (u32, usize)>,
}

impl DbcModel {
    /// Parse DBC text into a validated model
    pub fn load(dbc_text: &str) -> Result<Self> {
        let messages = crate::signals::dbc::parse_dbc_str(dbc_text)?;
        Self::from_messages(messages)
    }

    /// Build a model from already-converted message definitions
    ///
    /// Validates ID uniqueness, multiplexer references and bit spans, then
    /// assigns public names. Any failure discards the whole model.
    pub fn from_messages(messages: Vec<MessageDefinition>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for message in messages {
            validate_message(&message)?;
            let id = message.id;
            if by_id.insert(id, message).is_some() {
                return Err(MetricsError::Parse(format!(
                    "Duplicate message ID 0x{:X}",
                    id
                )));
            }
        }

        // Count declared names across the whole model to find collisions
        let mut occurrences: HashMap<String, usize> = HashMap::new();
        for message in by_id.values() {
            for signal in &message.signals {
                *occurrences.entry(signal.name.clone()).or_insert(0) += 1;
            }
        }

        let mut signal_lookup = HashMap::new();
        for message in by_id.values_mut() {
            for (sig_idx, signal) in message.signals.iter_mut().enumerate() {
                signal.public_name = if occurrences[&signal.name] > 1 {
                    format!("{}.{}", message.name, signal.name)
                } else {
                    signal.name.clone()
                };
                signal_lookup.insert(signal.public_name.clone(), (message.id, sig_idx));
            }
        }

        Ok(Self {
            messages: by_id,
            signal_lookup,
        })
    }

    /// Get the message definition for an arbitration ID
    pub fn lookup_message(&self, arbitration_id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&arbitration_id)
    }

    /// Iterate messages in ascending ID order
    pub fn messages(&self) -> impl Iterator<Item = &MessageDefinition> {
        self.messages.values()
    }

    /// Find a signal by its public name
    pub fn find_signal(&self, public_name: &str) -> Option<(u32, &SignalDefinition)> {
        let (can_id, sig_idx) = self.signal_lookup.get(public_name)?;
        self.messages
            .get(can_id)
            .and_then(|msg| msg.signals.get(*sig_idx))
            .map(|sig| (*can_id, sig))
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.values().map(|msg| msg.signals.len()).sum(),
            num_multiplexed: self
                .messages
                .values()
                .filter(|msg| msg.is_multiplexed())
                .count(),
        }
    }
}

fn validate_message(message: &MessageDefinition) -> Result<()> {
    let mut switch_count = 0;
    for signal in &message.signals {
        if signal.length == 0 || signal.length > 64 {
            return Err(MetricsError::Parse(format!(
                "Signal '{}' in message '{}' has unsupported length {}",
                signal.name, message.name, signal.length
            )));
        }

        let required = signal.required_bytes();
        if required > message.size {
            return Err(MetricsError::Parse(format!(
                "Signal '{}' spans {} bytes but message '{}' is only {} bytes",
                signal.name, required, message.name, message.size
            )));
        }

        if signal.is_multiplexer {
            if signal.multiplex_value.is_some() {
                return Err(MetricsError::Parse(format!(
                    "Signal '{}' in message '{}' is a multiplexed multiplexer; \
                     extended multiplexing is not supported",
                    signal.name, message.name
                )));
            }
            switch_count += 1;
        }
    }

    if switch_count > 1 {
        return Err(MetricsError::Parse(format!(
            "Message '{}' declares {} multiplexer signals",
            message.name, switch_count
        )));
    }

    let has_muxed = message.signals.iter().any(|s| s.multiplex_value.is_some());
    match (&message.multiplexer_signal, has_muxed) {
        (None, true) => Err(MetricsError::Parse(format!(
            "Message '{}' has multiplexed signals but no multiplexer",
            message.name
        ))),
        (Some(name), _) if message.multiplexer().is_none() => Err(MetricsError::Parse(format!(
            "Message '{}' references undeclared multiplexer '{}'",
            message.name, name
        ))),
        _ => Ok(()),
    }
}

/// Model statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub num_messages: usize,
    pub num_signals: usize,
    /// Messages carrying a multiplexer switch
    pub num_multiplexed: usize,
}
