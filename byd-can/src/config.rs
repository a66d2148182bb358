//! Codec configuration types
//!
//! Checksum keys and receive-side verification. Layouts themselves come
//! from the DBC dictionary; this only covers what a DBC cannot express.

use crate::checksum::CHECKSUM_KEY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for the message codec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Whether received frames must carry a valid checksum to be decoded
    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    /// Key used for every message without an explicit override
    #[serde(default = "default_checksum_key")]
    pub default_checksum_key: u8,

    /// Per-message checksum keys (message name -> key)
    #[serde(default)]
    pub checksum_keys: BTreeMap<String, u8>,
}

fn default_true() -> bool {
    true
}

fn default_checksum_key() -> u8 {
    CHECKSUM_KEY
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            default_checksum_key: CHECKSUM_KEY,
            checksum_keys: BTreeMap::new(),
        }
    }
}

impl CodecConfig {
    /// Create a new codec configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: enable or disable receive checksum verification
    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    /// Builder method: override the checksum key of one message
    pub fn with_checksum_key(mut self, message: impl Into<String>, key: u8) -> Self {
        self.checksum_keys.insert(message.into(), key);
        self
    }

    /// Checksum key for a message
    pub fn checksum_key(&self, message: &str) -> u8 {
        self.checksum_keys
            .get(message)
            .copied()
            .unwrap_or(self.default_checksum_key)
    }
}
