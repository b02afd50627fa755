//! Capture log format parsers
//!
//! The telemetry rig writes a single line-oriented hexadecimal format. Each
//! parser turns a line into a [`CanFrame`](crate::types::CanFrame) or a
//! [`MalformedLine`](crate::types::MalformedLine) describing why it was rejected.

pub mod raw;

// Re-export parser types
pub use raw::{tokenize, CaptureLine, CaptureLines, MIN_LINE_LEN};
