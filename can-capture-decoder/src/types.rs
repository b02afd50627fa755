//! Core types for the CAN capture decoder library
//!
//! This module defines the frame, row and error types that flow through the
//! decoding pipeline. Frames are transient: a capture line is tokenized into a
//! [`CanFrame`], decoded against the signal database and immediately turned into
//! [`SignalRow`]s.

use chrono::NaiveDateTime;
use std::fmt;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Format used for absolute row timestamps
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Classic CAN payload limit in bytes
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Raw CAN frame tokenized from one capture line
///
/// The capture rig timestamps frames with a millisecond counter that starts
/// at zero when the file is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// Millisecond counter since the start of the capture file
    pub timestamp_ms: u32,
    /// CAN arbitration ID (11-bit or 29-bit)
    pub can_id: u32,
    /// Frame data bytes (0-8 bytes)
    pub data: Vec<u8>,
}

impl CanFrame {
    /// Timestamp in seconds since the start of the capture file
    pub fn timestamp_secs(&self) -> f64 {
        f64::from(self.timestamp_ms) / 1000.0
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// Errors that abort an operation (a whole file, a batch or a DBC load)
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Why a capture line failed the tokenizer precondition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedLine {
    #[error("line too short ({0} chars, need at least 17)")]
    TooShort(usize),

    #[error("missing 'x' separator at offset 8")]
    MissingSeparator,

    #[error("timestamp is not hexadecimal")]
    InvalidTimestamp,

    #[error("CAN ID is not hexadecimal")]
    InvalidCanId,

    #[error("payload has odd length ({0} hex chars)")]
    OddPayload(usize),

    #[error("payload is not hexadecimal")]
    InvalidPayload,

    #[error("payload too long ({0} bytes, classic CAN allows 8)")]
    PayloadTooLong(usize),
}

/// Why a matched frame could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload has {actual} bytes, message requires {expected}")]
    PayloadTooShort { expected: usize, actual: usize },

    #[error("signal '{signal}' reaches past the {payload_len}-byte payload")]
    SignalOutOfRange { signal: String, payload_len: usize },

    #[error("signal '{signal}' has invalid length {length}")]
    InvalidLength { signal: String, length: u16 },
}

/// Why a capture line was diverted to the skip stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("malformed line: {0}")]
    Malformed(#[from] MalformedLine),

    #[error("unknown CAN ID 0x{0:X}")]
    UnknownMessage(u32),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// A decoded signal with its physical value
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    /// Signal name from the DBC
    pub name: String,
    /// Physical value (raw * factor + offset)
    pub value: SignalValue,
    /// Engineering unit (e.g., "km/h", "°C", "V")
    pub unit: Option<String>,
    /// Raw value before scaling (useful for debugging)
    pub raw_value: i64,
}

/// Signal value types supported by the decoder
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalValue {
    /// Integer value (integral factor and offset)
    Integer(i64),
    /// Floating-point value (after scaling/offset)
    Float(f64),
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Integer(v) => write!(f, "{}", v),
            // Debug keeps a decimal point on integral floats ("1.0")
            SignalValue::Float(v) => write!(f, "{:?}", v),
        }
    }
}

impl SignalValue {
    /// Parse a value field written by [`SignalValue`]'s `Display`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(v) = text.parse::<i64>() {
            return Some(SignalValue::Integer(v));
        }
        text.parse::<f64>().ok().map(SignalValue::Float)
    }

    /// Convert signal value to f64
    pub fn as_f64(&self) -> f64 {
        match self {
            SignalValue::Integer(v) => *v as f64,
            SignalValue::Float(v) => *v,
        }
    }

    /// Convert signal value to i64 if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SignalValue::Integer(v) => Some(*v),
            SignalValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            SignalValue::Float(_) => None,
        }
    }
}

/// Timestamp carried by a [`SignalRow`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowTimestamp {
    /// Seconds since the start of the capture file
    Relative(f64),
    /// Absolute time after normalization against the reference epoch
    Absolute(NaiveDateTime),
}

impl fmt::Display for RowTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowTimestamp::Relative(secs) => write!(f, "{:?}", secs),
            RowTimestamp::Absolute(at) => write!(f, "{}", at.format(ISO_FORMAT)),
        }
    }
}

/// One decoded output row: a signal value at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRow {
    pub timestamp: RowTimestamp,
    /// Signal name (the "sender" column in tabular files)
    pub signal: String,
    pub value: SignalValue,
}

impl SignalRow {
    /// Create a row with a relative timestamp in seconds
    pub fn relative(timestamp: f64, signal: impl Into<String>, value: SignalValue) -> Self {
        Self {
            timestamp: RowTimestamp::Relative(timestamp),
            signal: signal.into(),
            value,
        }
    }
}
