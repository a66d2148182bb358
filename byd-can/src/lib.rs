//! BYD CAN Codec Library
//!
//! Bit-exact encoding and decoding of the BYD general powertrain bus, driven
//! by the DBC signal dictionary.
//!
//! # Architecture
//!
//! - `SignalDatabase` holds message layouts parsed from DBC text
//! - `MessageCodec` packs named signals into frames (adding the 4-bit rolling
//!   counter and the checksum byte) and unpacks received frames
//! - `byd_checksum` is the nibble-sum integrity algorithm the ECUs verify
//!
//! The library knows nothing about vehicle semantics; the control core
//! (byd-control) gives the signals their meaning.
//!
//! # Example Usage
//!
//! ```no_run
//! use byd_can::{CodecConfig, MessageCodec, SignalValues};
//!
//! let mut codec = MessageCodec::byd(CodecConfig::default()).unwrap();
//!
//! let mut fields = SignalValues::new();
//! fields.set("LKAS_OUTPUT", 120.0).set_flag("STEER_REQ", true);
//! let frame = codec.encode("STEERING_MODULE_ADAS", 0, &fields).unwrap();
//!
//! let decoded = codec.decode(&frame).unwrap();
//! assert_eq!(decoded.values.get("LKAS_OUTPUT"), Some(120.0));
//! ```

// Public modules
pub mod checksum;
pub mod codec;
pub mod config;
pub mod signals;
pub mod types;

// Re-export main types for convenience
pub use checksum::{byd_checksum, CHECKSUM_KEY};
pub use codec::{CodecStats, MessageCodec, BYD_GENERAL_PT};
pub use config::CodecConfig;
pub use signals::{DatabaseStats, MessageDefinition, SignalDatabase, SignalDefinition};
pub use types::{CanFrame, CodecError, DecodedMessage, Result, SignalValues, MAX_DLC};

// Internal modules (not exposed in public API)
mod bits;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
