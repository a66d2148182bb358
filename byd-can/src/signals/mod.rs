//! Signal layout database and DBC parser
//!
//! This module contains the parser for the DBC signal-layout dictionary
//! and the database it populates.

pub mod dbc;
pub mod database;

// Re-export key types for convenience
pub use database::{
    ByteOrder, DatabaseStats, MessageDefinition, SignalDatabase, SignalDefinition, ValueType,
    CHECKSUM_SIGNAL, COUNTER_SIGNAL,
};
