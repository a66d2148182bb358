//! Core types for the BYD CAN codec
//!
//! This module defines the raw frame, the decoded message and the error type
//! shared by every part of the codec. Nothing here knows about vehicle
//! semantics; signals are plain named physical values.

use std::collections::BTreeMap;
use std::fmt;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Classic CAN payload size
pub const MAX_DLC: usize = 8;

/// Raw CAN frame as exchanged with the transport layer
///
/// Frames are immutable once constructed. The payload is stored inline so a
/// frame is `Copy` and never allocates inside the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanFrame {
    address: u32,
    bus: u8,
    data: [u8; MAX_DLC],
    len: u8,
}

impl CanFrame {
    /// Build a frame; payloads longer than 8 bytes are truncated
    pub fn new(address: u32, bus: u8, data: &[u8]) -> Self {
        let mut fixed = [0u8; MAX_DLC];
        let len = data.len().min(MAX_DLC);
        fixed[..len].copy_from_slice(&data[..len]);

        Self {
            address,
            bus,
            data: fixed,
            len: len as u8,
        }
    }

    /// Arbitration id
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Logical bus index the frame was seen on / is destined for
    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// Valid payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.len as usize
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X}@{} [", self.address, self.bus)?;
        for (i, byte) in self.data().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "]")
    }
}

/// Errors that can occur while loading layouts or coding frames
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),

    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    #[error("Unknown message: CAN ID 0x{0:X}")]
    UnknownMessageId(u32),

    #[error("Unknown signal '{signal}' in message {message}")]
    UnknownSignal { message: String, signal: String },

    #[error("Malformed frame 0x{id:X}: layout needs {expected} bytes, frame has {actual}")]
    MalformedFrame {
        id: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Checksum mismatch on 0x{id:X}: computed 0x{expected:02X}, frame carries 0x{actual:02X}")]
    ChecksumMismatch { id: u32, expected: u8, actual: u8 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Named physical signal values of one message
///
/// Used both as the input of an encode and the output of a decode. Ordered
/// by name so iteration (and therefore logging and test output) is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalValues(BTreeMap<String, f64>);

impl SignalValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a physical value
    pub fn set(&mut self, name: impl Into<String>, value: f64) -> &mut Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Set a single-bit flag
    pub fn set_flag(&mut self, name: impl Into<String>, value: bool) -> &mut Self {
        self.set(name, if value { 1.0 } else { 0.0 })
    }

    /// Get a physical value
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Get a value interpreted as a flag (non-zero = set)
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| v != 0.0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for SignalValues {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A frame decoded against the layout database
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// CAN message ID
    pub id: u32,
    /// Message name from the DBC
    pub name: String,
    /// Bus the frame was received on
    pub bus: u8,
    /// Rolling counter carried by the frame, if the message has one
    pub counter: Option<u8>,
    /// False when the counter repeats the previous frame of this message/bus
    pub fresh: bool,
    /// All decoded signals (physical values)
    pub values: SignalValues,
}
