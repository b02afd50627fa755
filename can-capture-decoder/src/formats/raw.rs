//! Raw capture line tokenizer
//!
//! The capture rig writes one frame per line in a fixed hexadecimal layout:
//!
//! ```text
//! TTTTTTTTxIIIIIIIIDDDDDDDDDDDDDDDD
//! 0000000Ax12345678FF00FF00FF00FF00
//! ```
//!
//! - `T`: 8 hex digits, millisecond counter since the file was opened
//! - `x`: literal separator at offset 8
//! - `I`: 8 hex digits, CAN arbitration ID
//! - `D`: 0 to 16 hex digits, payload bytes

use crate::types::{CanFrame, MalformedLine, MAX_PAYLOAD_LEN};
use std::borrow::Cow;
use std::io::BufRead;

/// Minimum trimmed line length: timestamp, separator and CAN ID
pub const MIN_LINE_LEN: usize = 17;

const SEPARATOR_OFFSET: usize = 8;
const ID_END: usize = 17;

/// Tokenize one capture line into a [`CanFrame`]
///
/// The line is trimmed before the length and separator checks. Odd-length
/// payloads, non-hex characters and payloads longer than 8 bytes are all
/// rejected as malformed.
pub fn tokenize(line: &str) -> Result<CanFrame, MalformedLine> {
    let line = line.trim();
    let len = line.chars().count();
    if len < MIN_LINE_LEN {
        return Err(MalformedLine::TooShort(len));
    }
    if line.as_bytes().get(SEPARATOR_OFFSET) != Some(&b'x') {
        return Err(MalformedLine::MissingSeparator);
    }
    // Anything non-ASCII cannot be a hex digit; bail before slicing by bytes
    if !line.is_ascii() {
        return Err(MalformedLine::InvalidPayload);
    }

    let timestamp_ms = parse_hex_u32(&line[..SEPARATOR_OFFSET])
        .ok_or(MalformedLine::InvalidTimestamp)?;
    let can_id = parse_hex_u32(&line[SEPARATOR_OFFSET + 1..ID_END])
        .ok_or(MalformedLine::InvalidCanId)?;
    let data = parse_payload(&line[ID_END..])?;

    Ok(CanFrame {
        timestamp_ms,
        can_id,
        data,
    })
}

fn parse_hex_u32(digits: &str) -> Option<u32> {
    // from_str_radix would accept a leading '+'
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

fn parse_payload(hex: &str) -> Result<Vec<u8>, MalformedLine> {
    if hex.len() % 2 != 0 {
        return Err(MalformedLine::OddPayload(hex.len()));
    }
    if hex.len() / 2 > MAX_PAYLOAD_LEN {
        return Err(MalformedLine::PayloadTooLong(hex.len() / 2));
    }

    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = hex_value(pair[0])?;
            let lo = hex_value(pair[1])?;
            Some((hi << 4) | lo)
        })
        .collect::<Option<Vec<u8>>>()
        .ok_or(MalformedLine::InvalidPayload)
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// One line of a capture file, terminator stripped
///
/// The raw bytes are kept so that rejected lines can be copied to the skip
/// stream exactly as the rig wrote them, even when they are not valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureLine {
    bytes: Vec<u8>,
}

impl CaptureLine {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The line as text; invalid UTF-8 becomes U+FFFD and fails tokenizing
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Iterator over the lines of a capture file
///
/// Line terminators (`\n` or `\r\n`) are stripped; everything else is kept
/// byte for byte.
pub struct CaptureLines<R> {
    reader: R,
}

impl<R: BufRead> CaptureLines<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> Iterator for CaptureLines<R> {
    type Item = std::io::Result<CaptureLine>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = Vec::with_capacity(64);
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                Some(Ok(CaptureLine::new(buf)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
