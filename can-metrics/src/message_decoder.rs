//! Message Decoding Engine
//!
//! Extracts signal values from raw CAN frames based on the layouts in a
//! [`DbcModel`]. Handles bit extraction, endianness, multiplexing, sign
//! extension and physical value conversion.

use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
use crate::signals::DbcModel;
use crate::types::{DecodedSample, MetricsError, RawFrame, Result};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Result of decoding one known frame
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub arbitration_id: u32,
    /// Samples in signal declaration order
    pub samples: Vec<DecodedSample>,
    /// Active multiplexer value (if message is multiplexed)
    pub multiplexer_value: Option<u64>,
    /// Signals whose physical value was not a finite number
    pub rejected: usize,
}

/// Decode one frame against a model
///
/// Frames whose ID the model does not define yield no samples. A payload
/// shorter than the message's declared length is a
/// [`MetricsError::FrameTooShort`].
pub fn decode(model: &DbcModel, frame: &RawFrame) -> Result<Vec<DecodedSample>> {
    match MessageDecoder::decode_frame(model, frame) {
        Ok(decoded) => Ok(decoded.samples),
        Err(MetricsError::UnknownMessage(_)) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Message decoder - extracts signals from CAN frames
pub struct MessageDecoder;

impl MessageDecoder {
    /// Look up the frame's message in the model and decode it
    ///
    /// An ID the model does not define is a [`MetricsError::UnknownMessage`].
    pub fn decode_frame(model: &DbcModel, frame: &RawFrame) -> Result<DecodedFrame> {
        let Some(message_def) = model.lookup_message(frame.arbitration_id) else {
            log::trace!("Unknown CAN ID: 0x{:X}, skipping frame", frame.arbitration_id);
            return Err(MetricsError::UnknownMessage(frame.arbitration_id));
        };

        log::debug!(
            "Decoding message: {} (ID 0x{:X})",
            message_def.name,
            frame.arbitration_id
        );
        Self::decode_message(frame, message_def)
    }

    /// Decode a CAN frame using its message definition
    pub fn decode_message(frame: &RawFrame, message_def: &MessageDefinition) -> Result<DecodedFrame> {
        if frame.data.len() < message_def.size {
            log::warn!(
                "Message '{}' requires {} bytes but frame only has {} bytes",
                message_def.name,
                message_def.size,
                frame.data.len()
            );
            return Err(MetricsError::FrameTooShort {
                arbitration_id: frame.arbitration_id,
                expected: message_def.size,
                actual: frame.data.len(),
            });
        }

        // For multiplexed messages, first extract the switch value
        let multiplexer_value = message_def
            .multiplexer()
            .map(|mux_signal| Self::extract_bits(&frame.data, mux_signal));

        let mut samples = Vec::with_capacity(message_def.signals.len());
        let mut rejected = 0;

        for signal in &message_def.signals {
            if let Some(switch_value) = signal.multiplex_value {
                if multiplexer_value != Some(switch_value) {
                    continue;
                }
            }

            let value = Self::physical_value(&frame.data, signal);
            if !value.is_finite() {
                log::warn!(
                    "Signal '{}' decoded to non-finite value {}, rejecting",
                    signal.public_name,
                    value
                );
                rejected += 1;
                continue;
            }

            samples.push(DecodedSample {
                name: signal.public_name.clone(),
                value,
                unit: signal.unit.clone(),
                timestamp: frame.timestamp,
            });
        }

        Ok(DecodedFrame {
            arbitration_id: frame.arbitration_id,
            samples,
            multiplexer_value,
            rejected,
        })
    }

    /// Raw integer value of a signal, sign-extended when the signal is signed
    pub fn raw_value(data: &[u8], signal: &SignalDefinition) -> i64 {
        let raw = Self::extract_bits(data, signal);
        match signal.value_type {
            ValueType::Unsigned => raw as i64,
            ValueType::Signed => Self::sign_extend(raw, signal.length as usize),
        }
    }

    /// Physical value: raw * factor + offset
    fn physical_value(data: &[u8], signal: &SignalDefinition) -> f64 {
        let raw = match signal.value_type {
            ValueType::Unsigned => Self::extract_bits(data, signal) as f64,
            ValueType::Signed => Self::raw_value(data, signal) as f64,
        };
        raw * signal.factor + signal.offset
    }

    /// Extract the unsigned bit field of a signal
    ///
    /// Classic frames (up to 8 bytes) are read as one 64-bit word; longer
    /// CAN-FD payloads walk the bits one at a time. The caller guarantees the
    /// payload covers the signal's span.
    fn extract_bits(data: &[u8], signal: &SignalDefinition) -> u64 {
        let start_bit = signal.start_bit as usize;
        let length = signal.length as usize;

        if data.len() <= 8 {
            let mut word = [0u8; 8];
            word[..data.len()].copy_from_slice(data);
            let extracted = match signal.byte_order {
                ByteOrder::LittleEndian => Self::word_little_endian(&word, start_bit, length),
                ByteOrder::BigEndian => Self::word_big_endian(&word, start_bit, length),
            };
            if let Some(value) = extracted {
                return value;
            }
        }

        match signal.byte_order {
            ByteOrder::LittleEndian => Self::extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => Self::extract_big_endian(data, start_bit, length),
        }
    }

    fn word_little_endian(word: &[u8; 8], start_bit: usize, length: usize) -> Option<u64> {
        if start_bit + length > 64 {
            return None;
        }
        let value = LittleEndian::read_u64(word);
        Some((value >> start_bit) & Self::mask(length))
    }

    /// In the big-endian word, sawtooth bit (byte b, bit k) sits at index (7 - b) * 8 + k
    fn word_big_endian(word: &[u8; 8], start_bit: usize, length: usize) -> Option<u64> {
        let msb_index = (7usize.checked_sub(start_bit / 8)?) * 8 + start_bit % 8;
        let lsb_index = (msb_index + 1).checked_sub(length)?;
        let value = BigEndian::read_u64(word);
        Some((value >> lsb_index) & Self::mask(length))
    }

    fn mask(length: usize) -> u64 {
        if length >= 64 {
            u64::MAX
        } else {
            (1u64 << length) - 1
        }
    }

    /// Extract signal with little-endian (Intel) byte order
    ///
    /// Little-endian format:
    /// - Start bit points to the LSB (least significant bit)
    /// - Bits are numbered from LSB to MSB within each byte
    /// - Byte 0 is the first byte in the CAN frame
    fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start_bit + i;
            let byte_idx = bit_pos / 8;
            let bit_in_byte = bit_pos % 8;

            if byte_idx < data.len() {
                let bit_value = (data[byte_idx] >> bit_in_byte) & 0x01;
                result |= (bit_value as u64) << i;
            }
        }

        result
    }

    /// Extract signal with big-endian (Motorola) byte order
    ///
    /// Big-endian format in DBC:
    /// - Start bit points to the MSB of the signal, numbered bit 7..0 within each byte
    /// - Reading proceeds towards lower significance; after bit 0 of a byte
    ///   it continues at bit 7 of the next byte
    fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;
        let mut bit_pos = start_bit;

        for _ in 0..length {
            let byte_idx = bit_pos / 8;
            let bit_in_byte = bit_pos % 8;

            let bit_value = data
                .get(byte_idx)
                .map(|byte| (byte >> bit_in_byte) & 0x01)
                .unwrap_or(0);
            result = (result << 1) | bit_value as u64;

            bit_pos = if bit_in_byte == 0 { bit_pos + 15 } else { bit_pos - 1 };
        }

        result
    }

    /// Sign-extend a value from N bits to 64 bits
    ///
    /// If the value's MSB is 1, fill the upper bits with 1s.
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
