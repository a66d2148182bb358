//! Message codec
//!
//! Packs named signal values into frames and unpacks frames into named
//! signal values, driven entirely by the layout database. Encoding fills in
//! the rolling counter and checksum of every message that declares them.

use crate::bits;
use crate::checksum::byd_checksum;
use crate::config::CodecConfig;
use crate::signals::{
    DatabaseStats, MessageDefinition, SignalDatabase, CHECKSUM_SIGNAL, COUNTER_SIGNAL,
};
use crate::types::{CanFrame, CodecError, DecodedMessage, Result, SignalValues, MAX_DLC};
use std::collections::HashMap;
use std::path::Path;

/// The BYD general powertrain signal dictionary
pub const BYD_GENERAL_PT: &str = include_str!("../dbc/byd_general_pt.dbc");

/// Counters are 4 bits wide on every BYD message
const COUNTER_MODULO: u8 = 16;

/// Running totals kept by the codec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStats {
    /// Frames produced by `encode`
    pub encoded: u64,
    /// Frames successfully decoded
    pub decoded: u64,
    /// Field values clamped because they did not fit their bit width
    pub overflows: u64,
    /// Frames too short for their layout
    pub malformed: u64,
    /// Frames whose checksum did not verify
    pub checksum_mismatches: u64,
}

/// Encoder/decoder for every message in the layout database
pub struct MessageCodec {
    signal_db: SignalDatabase,
    config: CodecConfig,
    /// Next counter to transmit, per message id
    tx_counters: HashMap<u32, u8>,
    /// Last received counter, per (message id, bus)
    rx_counters: HashMap<(u32, u8), u8>,
    stats: CodecStats,
}

impl MessageCodec {
    /// Create a codec over an already populated database
    ///
    /// Fails if the configuration names a message the database lacks.
    pub fn new(signal_db: SignalDatabase, config: CodecConfig) -> Result<Self> {
        for name in config.checksum_keys.keys() {
            if signal_db.get_message_by_name(name).is_none() {
                return Err(CodecError::UnknownMessage(name.clone()));
            }
        }

        Ok(Self {
            signal_db,
            config,
            tx_counters: HashMap::new(),
            rx_counters: HashMap::new(),
            stats: CodecStats::default(),
        })
    }

    /// Create a codec from DBC text
    pub fn from_dbc_str(dbc: &str, source: &str, config: CodecConfig) -> Result<Self> {
        let mut signal_db = SignalDatabase::new();
        for message in crate::signals::dbc::parse_dbc_str(dbc, source)? {
            signal_db.add_message(message);
        }
        Self::new(signal_db, config)
    }

    /// Create a codec for the BYD general powertrain dictionary
    pub fn byd(config: CodecConfig) -> Result<Self> {
        Self::from_dbc_str(BYD_GENERAL_PT, "byd_general_pt.dbc", config)
    }

    /// Load a DBC file and add its definitions to the signal database
    pub fn add_dbc(&mut self, path: &Path) -> Result<()> {
        log::info!("Loading DBC file: {:?}", path);

        for message in crate::signals::dbc::parse_dbc_file(path)? {
            self.signal_db.add_message(message);
        }

        log::info!("DBC file loaded successfully: {:?}", path);
        Ok(())
    }

    /// Get the signal database
    pub fn database(&self) -> &SignalDatabase {
        &self.signal_db
    }

    /// Get statistics about the loaded signal database
    pub fn database_stats(&self) -> DatabaseStats {
        self.signal_db.stats()
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn stats(&self) -> CodecStats {
        self.stats
    }

    /// Look up a message layout by name
    pub fn message(&self, name: &str) -> Result<&MessageDefinition> {
        self.signal_db
            .get_message_by_name(name)
            .ok_or_else(|| CodecError::UnknownMessage(name.to_string()))
    }

    /// Check that a message exists and every field names one of its signals
    pub fn check_fields(&self, name: &str, fields: &SignalValues) -> Result<()> {
        check_fields(self.message(name)?, fields)
    }

    /// Encode a message, assigning the next rolling counter
    ///
    /// The first frame of each message carries counter 0; each later frame
    /// increments it modulo 16, independently per message.
    pub fn encode(&mut self, name: &str, bus: u8, fields: &SignalValues) -> Result<CanFrame> {
        let message = self
            .signal_db
            .get_message_by_name(name)
            .ok_or_else(|| CodecError::UnknownMessage(name.to_string()))?;
        check_fields(message, fields)?;

        let counter = self.tx_counters.get(&message.id).copied().unwrap_or(0);
        let key = self.config.checksum_key(&message.name);
        let (data, overflows) = pack(message, fields, counter, key);

        if message.counter_signal().is_some() {
            self.tx_counters
                .insert(message.id, (counter + 1) % COUNTER_MODULO);
        }
        self.stats.encoded += 1;
        self.stats.overflows += overflows;

        let frame = CanFrame::new(message.id, bus, &data[..message.size.min(MAX_DLC)]);
        log::trace!("Encoded {} (counter {}): {}", message.name, counter, frame);
        Ok(frame)
    }

    /// Encode a message with an explicit counter, without touching the
    /// rolling counter state
    pub fn encode_with_counter(
        &mut self,
        name: &str,
        bus: u8,
        fields: &SignalValues,
        counter: u8,
    ) -> Result<CanFrame> {
        let message = self
            .signal_db
            .get_message_by_name(name)
            .ok_or_else(|| CodecError::UnknownMessage(name.to_string()))?;
        check_fields(message, fields)?;

        let key = self.config.checksum_key(&message.name);
        let (data, overflows) = pack(message, fields, counter % COUNTER_MODULO, key);
        self.stats.encoded += 1;
        self.stats.overflows += overflows;

        Ok(CanFrame::new(message.id, bus, &data[..message.size.min(MAX_DLC)]))
    }

    /// Decode a received frame
    ///
    /// Errors are per frame: `UnknownMessageId` for ids outside the
    /// dictionary, `MalformedFrame` when the payload is shorter than the
    /// layout, `ChecksumMismatch` when verification is enabled and fails.
    /// None of them disturb the state kept for other frames.
    pub fn decode(&mut self, frame: &CanFrame) -> Result<DecodedMessage> {
        let message = self
            .signal_db
            .get_message(frame.address())
            .ok_or(CodecError::UnknownMessageId(frame.address()))?;

        let data = frame.data();
        let required = message.required_len();
        if data.len() < required {
            self.stats.malformed += 1;
            return Err(CodecError::MalformedFrame {
                id: message.id,
                expected: required,
                actual: data.len(),
            });
        }

        if self.config.verify_checksums {
            if let Some(checksum) = message.checksum_signal() {
                let mut zeroed = [0u8; MAX_DLC];
                zeroed[..data.len()].copy_from_slice(data);
                bits::insert(&mut zeroed, checksum, 0);

                let key = self.config.checksum_key(&message.name);
                let expected = byd_checksum(key, &zeroed[..data.len()]);
                let actual = bits::extract(data, checksum) as u8;
                if expected != actual {
                    self.stats.checksum_mismatches += 1;
                    return Err(CodecError::ChecksumMismatch {
                        id: message.id,
                        expected,
                        actual,
                    });
                }
            }
        }

        let values: SignalValues = message
            .signals
            .iter()
            .map(|signal| {
                let raw = bits::extract_raw(data, signal);
                (signal.name.as_str(), signal.to_physical(raw))
            })
            .collect();

        let counter = message
            .counter_signal()
            .map(|signal| bits::extract(data, signal) as u8);
        let fresh = match counter {
            Some(counter) => {
                let previous = self.rx_counters.insert((message.id, frame.bus()), counter);
                previous != Some(counter)
            }
            None => true,
        };

        self.stats.decoded += 1;
        Ok(DecodedMessage {
            id: message.id,
            name: message.name.clone(),
            bus: frame.bus(),
            counter,
            fresh,
            values,
        })
    }

    /// Forget all transmit and receive counters
    pub fn reset_counters(&mut self) {
        self.tx_counters.clear();
        self.rx_counters.clear();
    }
}

fn check_fields(message: &MessageDefinition, fields: &SignalValues) -> Result<()> {
    for (name, _) in fields.iter() {
        if message.signal(name).is_none() {
            return Err(CodecError::UnknownSignal {
                message: message.name.clone(),
                signal: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Pack all fields, the counter, then the checksum over the result
///
/// Returns the payload and the number of fields that had to be clamped.
fn pack(
    message: &MessageDefinition,
    fields: &SignalValues,
    counter: u8,
    key: u8,
) -> ([u8; MAX_DLC], u64) {
    let mut data = [0u8; MAX_DLC];
    let mut overflows = 0;

    for signal in &message.signals {
        let raw = match signal.name.as_str() {
            CHECKSUM_SIGNAL => continue,
            COUNTER_SIGNAL => i64::from(counter),
            name => match fields.get(name) {
                Some(physical) => {
                    let (raw, clamped) = signal.to_raw(physical);
                    if clamped {
                        overflows += 1;
                        log::warn!(
                            "{}.{} = {} does not fit {} bits, clamped to raw {}",
                            message.name,
                            name,
                            physical,
                            signal.length,
                            raw
                        );
                    }
                    raw
                }
                None => signal.to_raw(0.0).0,
            },
        };
        bits::insert(&mut data, signal, raw);
    }

    if let Some(checksum) = message.checksum_signal() {
        let len = message.size.min(MAX_DLC);
        let value = byd_checksum(key, &data[..len]);
        bits::insert(&mut data, checksum, i64::from(value));
    }

    (data, overflows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::CHECKSUM_KEY;
    use proptest::prelude::*;

    fn codec() -> MessageCodec {
        MessageCodec::byd(CodecConfig::default()).unwrap()
    }

    fn steer_fields(torque: f64, angle: f64) -> SignalValues {
        let mut fields = SignalValues::new();
        fields
            .set("LKAS_OUTPUT", torque)
            .set_flag("STEER_REQ", true)
            .set("STEER_ANGLE", angle);
        fields
    }

    #[test]
    fn test_embedded_dictionary_loads() {
        let codec = codec();
        let stats = codec.database_stats();
        assert_eq!(stats.num_messages, 15);
        for name in ["STEERING_MODULE_ADAS", "ACC_CMD", "LKAS_HUD_ADAS", "ACC_HUD_ADAS", "ACC_EPS_STATE"] {
            let message = codec.message(name).unwrap();
            assert!(message.counter_signal().is_some(), "{} lacks COUNTER", name);
            assert!(message.checksum_signal().is_some(), "{} lacks CHECKSUM", name);
        }
    }

    #[test]
    fn test_round_trip() {
        let mut codec = codec();
        let frame = codec
            .encode("STEERING_MODULE_ADAS", 0, &steer_fields(-123.0, 12.3))
            .unwrap();
        assert_eq!(frame.address(), 0x1E2);
        assert_eq!(frame.dlc(), 8);

        let decoded = codec.decode(&frame).unwrap();
        assert_eq!(decoded.name, "STEERING_MODULE_ADAS");
        assert_eq!(decoded.values.get("LKAS_OUTPUT"), Some(-123.0));
        assert_eq!(decoded.values.flag("STEER_REQ"), Some(true));
        assert_eq!(decoded.values.flag("HANDS_ON_REQ"), Some(false));
        assert!((decoded.values.get("STEER_ANGLE").unwrap() - 12.3).abs() < 0.05);
        assert_eq!(decoded.counter, Some(0));
    }

    #[test]
    fn test_motorola_round_trip() {
        let mut codec = codec();
        let mut fields = SignalValues::new();
        fields.set("STEER_RATE_2", -250.0).set("STEER_ANGLE_2", 45.5);

        let frame = codec.encode("STEER_MODULE_2", 0, &fields).unwrap();
        let decoded = codec.decode(&frame).unwrap();
        assert_eq!(decoded.values.get("STEER_RATE_2"), Some(-250.0));
        assert!((decoded.values.get("STEER_ANGLE_2").unwrap() - 45.5).abs() < 0.05);
    }

    #[test]
    fn test_checksum_matches_engine_over_zeroed_field() {
        let mut codec = codec();
        let frame = codec
            .encode("ACC_CMD", 0, &SignalValues::new())
            .unwrap();

        let mut zeroed = [0u8; 8];
        zeroed.copy_from_slice(frame.data());
        zeroed[7] = 0;
        assert_eq!(frame.data()[7], byd_checksum(CHECKSUM_KEY, &zeroed));
    }

    #[test]
    fn test_counter_wraps_per_message() {
        let mut codec = codec();
        let fields = SignalValues::new();

        let counters: Vec<u8> = (0..17)
            .map(|_| {
                let frame = codec.encode("LKAS_HUD_ADAS", 0, &fields).unwrap();
                frame.data()[6] >> 4
            })
            .collect();
        let expected: Vec<u8> = (0..16).chain(std::iter::once(0)).collect();
        assert_eq!(counters, expected);

        // A different message keeps its own counter
        let other = codec.encode("ACC_HUD_ADAS", 0, &fields).unwrap();
        assert_eq!(other.data()[6] >> 4, 0);
    }

    #[test]
    fn test_encode_with_counter_leaves_rolling_state() {
        let mut codec = codec();
        let fields = SignalValues::new();
        let explicit = codec.encode_with_counter("ACC_CMD", 0, &fields, 9).unwrap();
        assert_eq!(explicit.data()[6] >> 4, 9);

        let rolling = codec.encode("ACC_CMD", 0, &fields).unwrap();
        assert_eq!(rolling.data()[6] >> 4, 0);
    }

    #[test]
    fn test_overflow_clamps_without_touching_neighbours() {
        let mut codec = codec();
        let mut fields = SignalValues::new();
        fields.set("LKAS_OUTPUT", 5000.0).set_flag("STEER_REQ", false);

        let frame = codec.encode("STEERING_MODULE_ADAS", 0, &fields).unwrap();
        assert_eq!(codec.stats().overflows, 1);

        let decoded = codec.decode(&frame).unwrap();
        assert_eq!(decoded.values.get("LKAS_OUTPUT"), Some(1023.0));
        assert_eq!(decoded.values.flag("STEER_REQ"), Some(false));
        assert_eq!(decoded.values.flag("STEER_REQ_ACTIVE_LOW"), Some(false));
    }

    #[test]
    fn test_unknown_message_and_signal() {
        let mut codec = codec();
        let fields = SignalValues::new();
        assert!(matches!(
            codec.encode("NOT_A_MESSAGE", 0, &fields),
            Err(CodecError::UnknownMessage(_))
        ));

        let mut bogus = SignalValues::new();
        bogus.set("NOT_A_SIGNAL", 1.0);
        assert!(matches!(
            codec.encode("ACC_CMD", 0, &bogus),
            Err(CodecError::UnknownSignal { .. })
        ));
    }

    #[test]
    fn test_unknown_checksum_key_override_is_rejected() {
        let config = CodecConfig::new().with_checksum_key("NOT_A_MESSAGE", 0x10);
        assert!(matches!(
            MessageCodec::byd(config),
            Err(CodecError::UnknownMessage(_))
        ));
    }

    #[test]
    fn test_decode_short_frame_is_malformed() {
        let mut codec = codec();
        let frame = CanFrame::new(0x1E2, 2, &[0x00, 0x01, 0x02]);
        assert!(matches!(
            codec.decode(&frame),
            Err(CodecError::MalformedFrame { expected: 8, actual: 3, .. })
        ));
        assert_eq!(codec.stats().malformed, 1);
    }

    #[test]
    fn test_decode_unknown_id() {
        let mut codec = codec();
        let frame = CanFrame::new(0x7FF, 0, &[0; 8]);
        assert!(matches!(
            codec.decode(&frame),
            Err(CodecError::UnknownMessageId(0x7FF))
        ));
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut codec = codec();
        let frame = codec
            .encode("PEDAL", 0, &SignalValues::new())
            .unwrap();
        let mut corrupted = [0u8; 8];
        corrupted.copy_from_slice(frame.data());
        corrupted[0] ^= 0x01;
        let corrupted = CanFrame::new(frame.address(), 0, &corrupted);

        assert!(matches!(
            codec.decode(&corrupted),
            Err(CodecError::ChecksumMismatch { .. })
        ));
        assert_eq!(codec.stats().checksum_mismatches, 1);

        let mut lenient = MessageCodec::byd(CodecConfig::new().with_checksum_verification(false)).unwrap();
        let decoded = lenient.decode(&corrupted).unwrap();
        assert_eq!(decoded.values.get("GAS_PEDAL"), Some(0.01));
    }

    #[test]
    fn test_decode_reports_repeated_counter() {
        let mut tx = codec();
        let mut rx = codec();
        let fields = SignalValues::new();

        let first = tx.encode("WHEEL_SPEED", 0, &fields).unwrap();
        let second = tx.encode("WHEEL_SPEED", 0, &fields).unwrap();

        assert!(rx.decode(&first).unwrap().fresh);
        assert!(!rx.decode(&first).unwrap().fresh);
        assert!(rx.decode(&second).unwrap().fresh);

        // Same message on another bus is tracked separately
        let other_bus = CanFrame::new(second.address(), 2, second.data());
        assert!(rx.decode(&other_bus).unwrap().fresh);
    }

    #[test]
    fn test_reset_counters() {
        let mut tx = codec();
        let mut rx = codec();
        let fields = SignalValues::new();

        tx.encode("ACC_CMD", 0, &fields).unwrap();
        let second = tx.encode("ACC_CMD", 0, &fields).unwrap();
        assert_eq!(rx.decode(&second).unwrap().counter, Some(1));

        tx.reset_counters();
        rx.reset_counters();
        let restarted = tx.encode("ACC_CMD", 0, &fields).unwrap();
        let decoded = rx.decode(&restarted).unwrap();
        assert_eq!(decoded.counter, Some(0));
        assert!(decoded.fresh);

        rx.reset_counters();
        assert!(rx.decode(&restarted).unwrap().fresh);
    }

    #[test]
    fn test_add_dbc_file() {
        use std::io::Write;

        let extra = r#"
VERSION ""

NS_ :
    NS_DESC_
    CM_
    BA_DEF_
    BA_
    VAL_

BS_:

BU_: EPS MPC

BO_ 1992 DIAG_PROBE: 8 MPC
 SG_ PROBE_VALUE : 0|8@1+ (1,0) [0|255] "" EPS
 SG_ COUNTER : 52|4@1+ (1,0) [0|15] "" EPS
 SG_ CHECKSUM : 56|8@1+ (1,0) [0|255] "" EPS
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(extra.as_bytes()).unwrap();
        file.flush().unwrap();

        let mut codec = codec();
        assert!(codec.message("DIAG_PROBE").is_err());

        codec.add_dbc(file.path()).unwrap();
        assert_eq!(codec.database_stats().num_messages, 16);

        let mut fields = SignalValues::new();
        fields.set("PROBE_VALUE", 42.0);
        let frame = codec.encode("DIAG_PROBE", 0, &fields).unwrap();
        assert_eq!(frame.address(), 1992);
        assert_eq!(codec.decode(&frame).unwrap().values.get("PROBE_VALUE"), Some(42.0));

        let missing = codec.add_dbc(Path::new("/nonexistent/extra.dbc"));
        assert!(matches!(missing, Err(CodecError::IoError(_))));
    }

    proptest! {
        #[test]
        fn prop_every_catalogue_signal_round_trips(
            fractions in proptest::collection::vec(0.0f64..=1.0, 32)
        ) {
            let mut codec = codec();
            let ids = codec.database().get_all_can_ids();

            for id in ids {
                let message = codec.database().get_message(id).unwrap().clone();
                let mut fields = SignalValues::new();
                for (i, signal) in message.signals.iter().enumerate() {
                    if signal.name == COUNTER_SIGNAL || signal.name == CHECKSUM_SIGNAL {
                        continue;
                    }
                    let (min, max) = signal.raw_range();
                    let span = (max - min) as f64;
                    let raw = min + (span * fractions[i % fractions.len()]).round() as i64;
                    fields.set(signal.name.as_str(), signal.to_physical(raw.clamp(min, max)));
                }

                let frame = codec.encode(&message.name, 0, &fields).unwrap();
                let decoded = codec.decode(&frame).unwrap();
                for (name, expected) in fields.iter() {
                    let signal = message.signal(name).unwrap();
                    let actual = decoded.values.get(name).unwrap();
                    prop_assert!(
                        (actual - expected).abs() <= signal.factor / 2.0,
                        "{}.{}: sent {} got {}", message.name, name, expected, actual
                    );
                }
            }
            prop_assert_eq!(codec.stats().overflows, 0);
        }
    }
}
