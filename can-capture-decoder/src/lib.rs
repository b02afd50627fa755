//! CAN Capture Decoder Library
//!
//! Decodes raw CAN capture logs from the vehicle telemetry rig into
//! time-series rows (timestamp, signal, value) using DBC signal definitions.
//!
//! # Architecture
//!
//! The pipeline is built from small, independent stages:
//! - Tokenize each capture line into a CAN frame (`formats`)
//! - Look the frame's ID up in the signal database (`signals`)
//! - Decode the payload into named signal values (`message_decoder`)
//! - Stream a whole file into a decoded CSV plus a skip file (`converter`)
//! - Fan files of a folder out over a thread pool (`batch`)
//! - Read decoded CSVs back and serialize rows for serving (`tabular`)
//!
//! Lines that cannot be tokenized, matched or decoded are diverted to the
//! skip stream; they never abort a run.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_capture_decoder::{BatchConverter, Decoder, DecoderConfig};
//! use std::path::Path;
//!
//! let decoder = Decoder::from_dbc_files(&["vehicle.dbc"]).unwrap();
//! let config = DecoderConfig::new().with_output_dir("parsed_files");
//!
//! let report = BatchConverter::new(&decoder, config)
//!     .convert_folder(Path::new("captures"))
//!     .unwrap();
//!
//! for path in report.output_paths() {
//!     println!("Generated {:?}", path);
//! }
//! for failure in &report.failed {
//!     eprintln!("Failed {:?}: {}", failure.path, failure.error);
//! }
//! ```

// Public modules
pub mod batch;
pub mod config;
pub mod converter;
pub mod decoder;
pub mod formats;
pub mod signals;
pub mod tabular;
pub mod types;

// Re-export main types for convenience
pub use batch::{
    discover_files, find_decoded_files, BatchConverter, BatchReport, CancelToken, FileFailure,
};
pub use config::DecoderConfig;
pub use converter::{ConversionResult, FileConverter, FileReport, LineStats, OutputLayout};
pub use decoder::Decoder;
pub use signals::DatabaseStats;
pub use tabular::{parse_csv, to_csv_bytes, TabularReader};
pub use types::{
    CanFrame, DecodeError, DecodedSignal, DecoderError, MalformedLine, RejectReason, Result,
    RowTimestamp, SignalRow, SignalValue,
};

// Internal modules (not exposed in public API)
mod message_decoder;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        let decoder = Decoder::new();
        let stats = decoder.database_stats();
        assert_eq!(stats.num_messages, 0);
        assert!(!VERSION.is_empty());
    }
}
