//! DBC file parser
//!
//! Parses Vector DBC documents and converts them into our internal signal
//! database format.

use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
use crate::types::{CodecError, Result};
use std::path::Path;

/// Parse a DBC file and return message definitions
pub fn parse_dbc_file(path: &Path) -> Result<Vec<MessageDefinition>> {
    log::info!("Parsing DBC file: {:?}", path);

    let bytes = std::fs::read(path)?;

    // Try UTF-8 first, then fallback to Latin-1/Windows-1252 encoding
    let dbc_content = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("DBC file is not UTF-8, trying Latin-1 encoding");
            err.into_bytes().iter().map(|&b| b as char).collect()
        }
    };

    let source_filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.dbc");

    parse_dbc_str(&dbc_content, source_filename)
}

/// Parse DBC text (e.g. a dictionary compiled into the binary)
pub fn parse_dbc_str(dbc_content: &str, source: &str) -> Result<Vec<MessageDefinition>> {
    let dbc = can_dbc::DBC::from_slice(dbc_content.as_bytes()).map_err(|e| {
        CodecError::DbcParseError(format!("Failed to parse DBC {}: {:?}", source, e))
    })?;

    let mut messages = Vec::new();
    for dbc_msg in dbc.messages() {
        messages.push(convert_message(dbc_msg, source)?);
    }

    log::info!("Parsed {} messages from {}", messages.len(), source);

    Ok(messages)
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(dbc_msg: &can_dbc::Message, source: &str) -> Result<MessageDefinition> {
    let mut signals = Vec::new();
    for dbc_sig in dbc_msg.signals() {
        signals.push(convert_signal(dbc_sig)?);
    }

    let message = MessageDefinition {
        id: dbc_msg.message_id().0,
        name: dbc_msg.message_name().to_string(),
        size: *dbc_msg.message_size() as usize,
        sender: match dbc_msg.transmitter() {
            can_dbc::Transmitter::NodeName(name) => Some(name.to_string()),
            _ => None,
        },
        signals,
        source: source.to_string(),
    };

    for signal in &message.signals {
        if signal.byte_span() > message.size {
            return Err(CodecError::InvalidSignalDefinition(format!(
                "Signal '{}' of {} ends beyond the {}-byte payload",
                signal.name, message.name, message.size
            )));
        }
    }

    Ok(message)
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(dbc_sig: &can_dbc::Signal) -> Result<SignalDefinition> {
    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    let length = *dbc_sig.signal_size();
    if length == 0 || length > 64 {
        return Err(CodecError::InvalidSignalDefinition(format!(
            "Signal '{}' has unsupported width {}",
            dbc_sig.name(),
            length
        )));
    }

    if *dbc_sig.factor() == 0.0 {
        return Err(CodecError::InvalidSignalDefinition(format!(
            "Signal '{}' has a zero factor",
            dbc_sig.name()
        )));
    }

    Ok(SignalDefinition {
        name: dbc_sig.name().to_string(),
        start_bit: *dbc_sig.start_bit() as u16,
        length: length as u16,
        byte_order,
        value_type,
        factor: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        min: *dbc_sig.min(),
        max: *dbc_sig.max(),
        unit: if dbc_sig.unit().is_empty() {
            None
        } else {
            Some(dbc_sig.unit().to_string())
        },
    })
}
