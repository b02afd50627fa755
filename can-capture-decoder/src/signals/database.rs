//! Signal database
//!
//! Holds the message definitions loaded from one or more DBC files, keyed by
//! CAN arbitration ID. The database is built once and then only read, so it
//! can be shared by reference across worker threads.

use std::collections::HashMap;

/// A complete CAN message definition
#[derive(Debug, Clone)]
pub struct MessageDefinition {
    /// CAN arbitration ID (extended-frame flag stripped)
    pub id: u32,
    /// True if the DBC declares a 29-bit identifier
    pub is_extended: bool,
    /// Message name
    pub name: String,
    /// Message size in bytes (DLC)
    pub size: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// All signals in this message, in declaration order
    pub signals: Vec<SignalDefinition>,
    /// Multiplexer signal name (if multiplexed)
    pub multiplexer_signal: Option<String>,
    /// Source DBC filename
    pub source: String,
}

impl MessageDefinition {
    /// True if this message has multiplexed signals
    pub fn is_multiplexed(&self) -> bool {
        self.multiplexer_signal.is_some()
    }
}

/// A CAN signal definition
#[derive(Debug, Clone)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Start bit in the CAN frame (DBC numbering)
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
    /// Engineering unit (e.g., "km/h", "°C", "V")
    pub unit: Option<String>,
    /// Multiplexor switch value for which this signal is present
    pub multiplexer_value: Option<u64>,
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
    /// Signed integer
    Signed,
    /// Unsigned integer
    Unsigned,
}

/// The signal database
#[derive(Debug, Default)]
pub struct SignalDatabase {
    /// Key: CAN ID, Value: messages with that ID (can be multiple from different DBCs)
    messages: HashMap<u32, Vec<MessageDefinition>>,
}

impl SignalDatabase {
    /// Create a new empty signal database
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message definition to the database
    pub fn add_message(&mut self, message: MessageDefinition) {
        self.messages.entry(message.id).or_default().push(message);
    }

    /// Look up the message definition for a CAN ID
    ///
    /// When several DBC files define the same ID, the first one loaded wins.
    /// `None` is the normal answer for IDs the vehicle database does not know.
    pub fn lookup(&self, can_id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&can_id).and_then(|msgs| msgs.first())
    }

    /// Get all message definitions for a given CAN ID
    pub fn get_messages(&self, can_id: u32) -> Option<&[MessageDefinition]> {
        self.messages.get(&can_id).map(Vec::as_slice)
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        let num_messages: usize = self.messages.values().map(|v| v.len()).sum();
        let num_signals: usize = self
            .messages
            .values()
            .flat_map(|msgs| msgs.iter())
            .map(|msg| msg.signals.len())
            .sum();

        DatabaseStats {
            num_messages,
            num_signals,
        }
    }

    /// Get all unique CAN IDs in the database, sorted
    pub fn message_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.messages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}
