//! Main decoder API
//!
//! The [`Decoder`] owns the signal database and turns capture lines into
//! [`SignalRow`]s. It is loaded once and then shared read-only by every
//! worker of a batch.

use crate::formats::tokenize;
use crate::message_decoder::MessageDecoder;
use crate::signals::{DatabaseStats, MessageDefinition, SignalDatabase};
use crate::types::{CanFrame, RejectReason, Result, SignalRow};
use std::path::Path;

/// The main decoder struct - entry point for all decoding operations
#[derive(Debug, Default)]
pub struct Decoder {
    signal_db: SignalDatabase,
}

impl Decoder {
    /// Create a decoder with an empty signal database
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder from one or more DBC files
    ///
    /// Any DBC that fails to load aborts construction: nothing can be
    /// decoded without the database.
    pub fn from_dbc_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut decoder = Self::new();
        for path in paths {
            decoder.add_dbc(path.as_ref())?;
        }
        Ok(decoder)
    }

    /// Load a DBC file and add its definitions to the signal database
    ///
    /// # Example
    /// ```no_run
    /// use can_capture_decoder::Decoder;
    /// use std::path::Path;
    ///
    /// let mut decoder = Decoder::new();
    /// decoder.add_dbc(Path::new("vehicle.dbc")).unwrap();
    /// ```
    pub fn add_dbc(&mut self, path: &Path) -> Result<()> {
        log::info!("Loading DBC file: {:?}", path);

        let messages = crate::signals::dbc::parse_dbc_file(path)?;
        for message in messages {
            self.signal_db.add_message(message);
        }

        log::info!("DBC file loaded successfully: {:?}", path);
        Ok(())
    }

    /// Add DBC definitions that are already in memory
    pub fn add_dbc_str(&mut self, content: &str, source: &str) -> Result<()> {
        for message in crate::signals::dbc::parse_dbc_str(content, source)? {
            self.signal_db.add_message(message);
        }
        Ok(())
    }

    /// Look up the message definition for a CAN ID
    pub fn lookup(&self, can_id: u32) -> Option<&MessageDefinition> {
        self.signal_db.lookup(can_id)
    }

    /// Decode one capture line into rows, one per decoded signal
    ///
    /// Every failure is a [`RejectReason`]: the caller diverts the line and
    /// carries on.
    pub fn decode_line(&self, line: &str) -> std::result::Result<Vec<SignalRow>, RejectReason> {
        let frame = tokenize(line)?;
        self.decode_frame(&frame)
    }

    /// Decode an already tokenized frame
    pub fn decode_frame(&self, frame: &CanFrame) -> std::result::Result<Vec<SignalRow>, RejectReason> {
        let message_def = self
            .signal_db
            .lookup(frame.can_id)
            .ok_or(RejectReason::UnknownMessage(frame.can_id))?;

        let signals = MessageDecoder::decode(message_def, &frame.data)?;
        let timestamp = frame.timestamp_secs();

        Ok(signals
            .into_iter()
            .map(|signal| SignalRow::relative(timestamp, signal.name, signal.value))
            .collect())
    }

    /// Get statistics about the loaded signal database
    pub fn database_stats(&self) -> DatabaseStats {
        self.signal_db.stats()
    }

    /// Access the underlying signal database
    pub fn database(&self) -> &SignalDatabase {
        &self.signal_db
    }
}
