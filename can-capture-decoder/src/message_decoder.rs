//! Message Decoding Engine
//!
//! Extracts signal values from raw CAN payloads based on signal definitions
//! from the signal database. Handles bit extraction, endianness, multiplexing,
//! and physical value conversion.

use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
use crate::types::{DecodeError, DecodedSignal, SignalValue};

/// Message decoder - extracts signals from CAN payloads
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode every signal of a message from a payload
    ///
    /// Decoding is all-or-nothing: if any signal cannot be extracted the whole
    /// frame is rejected, so callers never see a partially decoded frame.
    /// Signals are returned in the order the DBC declares them. For
    /// multiplexed messages only the signals selected by the current
    /// multiplexor value are returned.
    ///
    /// # Errors
    /// * [`DecodeError::PayloadTooShort`] if the payload is shorter than the DLC
    /// * [`DecodeError::SignalOutOfRange`] if a signal reaches past the payload
    pub fn decode(
        message_def: &MessageDefinition,
        data: &[u8],
    ) -> Result<Vec<DecodedSignal>, DecodeError> {
        if data.len() < message_def.size {
            return Err(DecodeError::PayloadTooShort {
                expected: message_def.size,
                actual: data.len(),
            });
        }

        let multiplexer_value = match message_def.multiplexer_signal {
            Some(ref mux_name) => message_def
                .signals
                .iter()
                .find(|s| s.name == *mux_name)
                .map(|mux_signal| Self::extract_signal_value(data, mux_signal))
                .transpose()?
                .map(|raw| raw as u64),
            None => None,
        };

        let mut decoded_signals = Vec::with_capacity(message_def.signals.len());
        for signal in &message_def.signals {
            if let Some(switch_value) = signal.multiplexer_value {
                if multiplexer_value != Some(switch_value) {
                    continue;
                }
            }
            decoded_signals.push(Self::decode_signal(data, signal)?);
        }

        Ok(decoded_signals)
    }

    /// Decode a single signal from CAN frame data
    fn decode_signal(data: &[u8], signal: &SignalDefinition) -> Result<DecodedSignal, DecodeError> {
        let raw_value = Self::extract_signal_value(data, signal)?;

        Ok(DecodedSignal {
            name: signal.name.clone(),
            value: Self::physical_value(raw_value, signal),
            unit: signal.unit.clone(),
            raw_value,
        })
    }

    /// Apply factor and offset
    ///
    /// Integral factor and offset keep the value an integer; anything else
    /// yields a float.
    fn physical_value(raw_value: i64, signal: &SignalDefinition) -> SignalValue {
        if let (Some(factor), Some(offset)) = (exact_i64(signal.factor), exact_i64(signal.offset)) {
            if let Some(value) = raw_value
                .checked_mul(factor)
                .and_then(|v| v.checked_add(offset))
            {
                return SignalValue::Integer(value);
            }
        }
        SignalValue::Float(signal.offset + signal.factor * (raw_value as f64))
    }

    /// Extract raw signal value from CAN frame data
    ///
    /// Handles bit extraction with proper endianness support and sign
    /// extension for signed signals.
    fn extract_signal_value(data: &[u8], signal: &SignalDefinition) -> Result<i64, DecodeError> {
        let start_bit = signal.start_bit as usize;
        let length = signal.length as usize;

        if length == 0 || length > 64 {
            return Err(DecodeError::InvalidLength {
                signal: signal.name.clone(),
                length: signal.length,
            });
        }

        let raw_value = match signal.byte_order {
            ByteOrder::LittleEndian => Self::extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => Self::extract_big_endian(data, start_bit, length),
        }
        .ok_or_else(|| DecodeError::SignalOutOfRange {
            signal: signal.name.clone(),
            payload_len: data.len(),
        })?;

        Ok(match signal.value_type {
            ValueType::Unsigned => raw_value as i64,
            ValueType::Signed => Self::sign_extend(raw_value, length),
        })
    }

    /// Extract signal with little-endian (Intel) byte order
    ///
    /// Little-endian format:
    /// - Start bit points to the LSB (least significant bit)
    /// - Bits are numbered from LSB to MSB within each byte
    /// - Byte 0 is the first byte in the CAN frame
    fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> Option<u64> {
        let required_bytes = (start_bit + length + 7) / 8;
        if required_bytes > data.len() {
            return None;
        }

        let mut result: u64 = 0;
        for i in 0..length {
            let bit_pos = start_bit + i;
            let bit_value = (data[bit_pos / 8] >> (bit_pos % 8)) & 0x01;
            result |= (bit_value as u64) << i;
        }

        Some(result)
    }

    /// Extract signal with big-endian (Motorola) byte order
    ///
    /// Big-endian format in DBC files:
    /// - Start bit points to the MSB of the signal, numbered as `byte * 8 + bit`
    ///   with bit 0 the LSB of its byte
    /// - The signal continues towards the LSB of the same byte, then wraps to
    ///   the MSB (bit 7) of the next byte
    fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> Option<u64> {
        let mut result: u64 = 0;
        let mut bit_pos = start_bit;

        for _ in 0..length {
            let byte_idx = bit_pos / 8;
            let bit_in_byte = bit_pos % 8;
            let byte = *data.get(byte_idx)?;

            result = (result << 1) | u64::from((byte >> bit_in_byte) & 0x01);

            bit_pos = if bit_in_byte == 0 {
                bit_pos + 15
            } else {
                bit_pos - 1
            };
        }

        Some(result)
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

/// `Some` if the float is a whole number representable as i64
fn exact_i64(value: f64) -> Option<i64> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::database::tests::{message, signal};

    #[test]
    fn test_extract_little_endian_simple() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(MessageDecoder::extract_little_endian(&data, 0, 8), Some(0xAB));
    }

    #[test]
    fn test_extract_little_endian_cross_byte() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(MessageDecoder::extract_little_endian(&data, 0, 16), Some(0xCDAB));
        assert_eq!(MessageDecoder::extract_little_endian(&data, 4, 8), Some(0xDA));
    }

    #[test]
    fn test_extract_little_endian_out_of_range() {
        let data = vec![0xAB, 0xCD];
        assert_eq!(MessageDecoder::extract_little_endian(&data, 8, 16), None);
    }

    #[test]
    fn test_extract_big_endian_simple() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(MessageDecoder::extract_big_endian(&data, 7, 8), Some(0xAB));
        assert_eq!(MessageDecoder::extract_big_endian(&data, 7, 16), Some(0xABCD));
    }

    #[test]
    fn test_extract_big_endian_cross_byte() {
        // 12 bits: low nibble of byte 0, then all of byte 1
        let data = vec![0x0A, 0xBC];
        assert_eq!(MessageDecoder::extract_big_endian(&data, 3, 12), Some(0xABC));
    }

    #[test]
    fn test_extract_big_endian_out_of_range() {
        let data = vec![0x0A];
        assert_eq!(MessageDecoder::extract_big_endian(&data, 3, 12), None);
    }

    #[test]
    fn test_sign_extend_positive() {
        assert_eq!(MessageDecoder::sign_extend(0x7F, 8), 127);
    }

    #[test]
    fn test_sign_extend_negative() {
        assert_eq!(MessageDecoder::sign_extend(0xFF, 8), -1);
        assert_eq!(MessageDecoder::sign_extend(0x8000, 16), -32768);
    }

    #[test]
    fn test_decode_unsigned_byte() {
        let def = message(0x12345678, "Sensor", vec![signal("Temp", 0, 8)]);
        let data = [0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00];

        let decoded = MessageDecoder::decode(&def, &data).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name, "Temp");
        assert_eq!(decoded[0].value, SignalValue::Integer(255));
        assert_eq!(decoded[0].raw_value, 255);
    }

    #[test]
    fn test_decode_scaling_and_order() {
        let mut temp = signal("CoolantTemp", 0, 8);
        temp.offset = -40.0;
        let mut voltage = signal("Voltage", 8, 16);
        voltage.factor = 0.01;
        let mut torque = signal("Torque", 24, 8);
        torque.value_type = ValueType::Signed;

        let def = message(0x100, "Engine", vec![temp, voltage, torque]);
        let data = [100, 0xE8, 0x03, 0xFE, 0, 0, 0, 0];

        let decoded = MessageDecoder::decode(&def, &data).unwrap();
        let names: Vec<&str> = decoded.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["CoolantTemp", "Voltage", "Torque"]);
        assert_eq!(decoded[0].value, SignalValue::Integer(60));
        assert_eq!(decoded[1].value, SignalValue::Float(10.0));
        assert_eq!(decoded[2].value, SignalValue::Integer(-2));
    }

    #[test]
    fn test_decode_short_payload_rejected() {
        let def = message(0x100, "Engine", vec![signal("Rpm", 0, 16)]);
        let result = MessageDecoder::decode(&def, &[0x01, 0x02]);
        assert_eq!(
            result,
            Err(DecodeError::PayloadTooShort {
                expected: 8,
                actual: 2
            })
        );
    }

    #[test]
    fn test_decode_is_atomic() {
        let mut def = message(
            0x100,
            "Short",
            vec![signal("Fits", 0, 8), signal("TooFar", 8, 16)],
        );
        def.size = 2;

        let result = MessageDecoder::decode(&def, &[0x01, 0x02]);
        assert!(matches!(
            result,
            Err(DecodeError::SignalOutOfRange { ref signal, payload_len: 2 }) if signal == "TooFar"
        ));
    }

    #[test]
    fn test_decode_invalid_length() {
        let def = message(0x100, "Broken", vec![signal("Empty", 0, 0)]);
        let result = MessageDecoder::decode(&def, &[0; 8]);
        assert!(matches!(result, Err(DecodeError::InvalidLength { length: 0, .. })));
    }

    #[test]
    fn test_decode_multiplexed() {
        let mode = signal("Mode", 0, 8);
        let mut a = signal("SignalA", 8, 16);
        a.multiplexer_value = Some(0);
        let mut b = signal("SignalB", 8, 16);
        b.multiplexer_value = Some(1);

        let mut def = message(0x200, "Mux", vec![mode, a, b]);
        def.multiplexer_signal = Some("Mode".to_string());

        let decoded = MessageDecoder::decode(&def, &[1, 0x10, 0x00, 0, 0, 0, 0, 0]).unwrap();
        let names: Vec<&str> = decoded.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Mode", "SignalB"]);
        assert_eq!(decoded[1].value, SignalValue::Integer(16));
    }
}
