//! Signal layout database
//!
//! Holds every message layout loaded from the DBC dictionary and answers
//! lookups by CAN ID or by message name.

use std::collections::HashMap;

/// Name of the rolling-counter signal in every message that carries one
pub const COUNTER_SIGNAL: &str = "COUNTER";

/// Name of the checksum signal in every message that carries one
pub const CHECKSUM_SIGNAL: &str = "CHECKSUM";

/// A complete CAN message definition
#[derive(Debug, Clone)]
pub struct MessageDefinition {
    /// CAN message ID
    pub id: u32,
    /// Message name
    pub name: String,
    /// Message size in bytes
    pub size: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// All signals in this message
    pub signals: Vec<SignalDefinition>,
    /// Source file (DBC filename)
    pub source: String,
}

impl MessageDefinition {
    /// Find a signal by name
    pub fn signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// The rolling counter signal, if this message has one
    pub fn counter_signal(&self) -> Option<&SignalDefinition> {
        self.signal(COUNTER_SIGNAL)
    }

    /// The checksum signal, if this message has one
    pub fn checksum_signal(&self) -> Option<&SignalDefinition> {
        self.signal(CHECKSUM_SIGNAL)
    }

    /// Number of payload bytes the layout actually touches
    pub fn required_len(&self) -> usize {
        self.signals
            .iter()
            .map(SignalDefinition::byte_span)
            .max()
            .unwrap_or(0)
    }
}

/// A CAN signal definition
#[derive(Debug, Clone)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Start bit in the CAN frame (LSB for Intel, MSB for Motorola)
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    /// Byte order
    pub byte_order: ByteOrder,
    /// Value type (signed/unsigned)
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value
    pub min: f64,
    /// Maximum physical value
    pub max: f64,
    /// Engineering unit (e.g., "kph", "deg")
    pub unit: Option<String>,
}

impl SignalDefinition {
    /// Representable raw range for this bit width and signedness
    pub fn raw_range(&self) -> (i64, i64) {
        let length = u32::from(self.length.min(63));
        match self.value_type {
            ValueType::Unsigned => (0, (1i64 << length) - 1),
            ValueType::Signed => (-(1i64 << (length - 1)), (1i64 << (length - 1)) - 1),
        }
    }

    /// Raw to physical conversion
    pub fn to_physical(&self, raw: i64) -> f64 {
        self.offset + self.factor * raw as f64
    }

    /// Physical to raw conversion
    ///
    /// Returns the raw value clamped into the representable range, and
    /// whether clamping was needed.
    pub fn to_raw(&self, physical: f64) -> (i64, bool) {
        let (min, max) = self.raw_range();
        let scaled = ((physical - self.offset) / self.factor).round();

        if !scaled.is_finite() {
            return (0i64.clamp(min, max), true);
        }
        if scaled < min as f64 {
            (min, true)
        } else if scaled > max as f64 {
            (max, true)
        } else {
            (scaled as i64, false)
        }
    }

    /// Number of leading payload bytes needed to hold this signal
    pub fn byte_span(&self) -> usize {
        let mut last_byte = 0;
        crate::bits::for_each_bit(self, |frame_bit, _| {
            last_byte = last_byte.max(frame_bit / 8);
        });
        last_byte + 1
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
    /// Signed integer
    Signed,
    /// Unsigned integer
    Unsigned,
}

/// The signal layout database
pub struct SignalDatabase {
    /// All message definitions by CAN ID
    messages: HashMap<u32, MessageDefinition>,

    /// Message name lookup
    /// Key: Message name, Value: CAN ID
    message_lookup: HashMap<String, u32>,
}

impl SignalDatabase {
    /// Create a new empty signal database
    pub fn new() -> Self {
        Self {
            messages: HashMap::new(),
            message_lookup: HashMap::new(),
        }
    }

    /// Add a message definition to the database
    ///
    /// A later definition with the same CAN ID replaces the earlier one.
    pub fn add_message(&mut self, message: MessageDefinition) {
        if let Some(previous) = self.messages.get(&message.id) {
            log::warn!(
                "Message 0x{:X} ({}) redefined by {} from {}",
                message.id,
                previous.name,
                message.name,
                message.source
            );
            self.message_lookup.remove(&previous.name);
        }

        self.message_lookup.insert(message.name.clone(), message.id);
        self.messages.insert(message.id, message);
    }

    /// Get a message definition by CAN ID
    pub fn get_message(&self, can_id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&can_id)
    }

    /// Get a message definition by name
    pub fn get_message_by_name(&self, message_name: &str) -> Option<&MessageDefinition> {
        self.message_lookup
            .get(message_name)
            .and_then(|can_id| self.messages.get(can_id))
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        let num_messages = self.messages.len();
        let num_signals: usize = self.messages.values().map(|msg| msg.signals.len()).sum();

        DatabaseStats {
            num_messages,
            num_signals,
        }
    }

    /// Get all unique CAN IDs in the database
    pub fn get_all_can_ids(&self) -> Vec<u32> {
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

impl Default for SignalDatabase {
    fn default() -> Self {
        Self::new()
    }
}
