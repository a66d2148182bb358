//! Vehicle state tracking
//!
//! Decoded frames land in a `SignalTable`, newest value per (message, bus).
//! Once per cycle the tracker folds the table into a `VehicleState`
//! snapshot. A field whose source message has never been seen is `None`,
//! never a bare zero.

use crate::catalog::{self, CanBus};
use crate::config::{ControllerConfig, SignalOverride, VehicleConfig};
use byd_can::{CanFrame, CodecError, DecodedMessage, MessageCodec, SignalValues};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const KPH_TO_MS: f64 = 1.0 / 3.6;

/// Speed below which the vehicle counts as stopped, m/s
const STANDSTILL_SPEED: f64 = 0.01;

/// The camera's angle reads exactly zero while it is inactive
const ADAS_ANGLE_DEADBAND: f64 = 0.1;

/// Newest decoded values of one message on one bus
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEntry {
    pub values: SignalValues,
    pub counter: Option<u8>,
    /// Received since the last snapshot
    pub fresh: bool,
}

/// Newest decoded values per (message name, bus)
///
/// Entries are replaced wholesale; messages not received recently keep
/// their last known values.
#[derive(Debug, Default)]
pub struct SignalTable {
    buses: HashMap<u8, HashMap<String, SignalEntry>>,
}

impl SignalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a decoded message, replacing the previous entry
    pub fn insert(&mut self, decoded: DecodedMessage) {
        self.buses.entry(decoded.bus).or_default().insert(
            decoded.name,
            SignalEntry {
                values: decoded.values,
                counter: decoded.counter,
                fresh: true,
            },
        );
    }

    /// Clear the fresh mark of every entry, keeping the values
    pub fn mark_stale(&mut self) {
        for entry in self.buses.values_mut().flat_map(HashMap::values_mut) {
            entry.fresh = false;
        }
    }

    /// True when the message arrived since the last snapshot
    pub fn is_fresh(&self, message: &str, bus: u8) -> bool {
        self.get(message, bus).is_some_and(|entry| entry.fresh)
    }

    pub fn get(&self, message: &str, bus: u8) -> Option<&SignalEntry> {
        self.buses.get(&bus).and_then(|messages| messages.get(message))
    }

    /// Newest physical value of one signal
    pub fn value(&self, message: &str, bus: u8, signal: &str) -> Option<f64> {
        self.get(message, bus)?.values.get(signal)
    }

    /// Number of (message, bus) entries
    pub fn len(&self) -> usize {
        self.buses.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GearShifter {
    Park,
    Reverse,
    Neutral,
    Drive,
    Unknown,
}

impl GearShifter {
    /// Map the raw DRIVE_STATE.GEAR value
    pub fn from_raw(raw: f64) -> Self {
        match raw as i64 {
            1 => GearShifter::Park,
            2 => GearShifter::Reverse,
            3 => GearShifter::Neutral,
            4 => GearShifter::Drive,
            _ => GearShifter::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ButtonType {
    LeftBlinker,
    RightBlinker,
    AccelCruise,
    DecelCruise,
    Cancel,
    SetCruise,
    ResumeCruise,
    MainCruise,
    LkasToggle,
}

/// A press or release edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: ButtonType,
    pub pressed: bool,
}

/// Where a button is read from; `value` is the raw code meaning "pressed"
/// for multi-valued signals, `None` for plain flags
struct ButtonSource {
    button: ButtonType,
    message: &'static str,
    signal: &'static str,
    value: Option<f64>,
}

const BUTTONS: &[ButtonSource] = &[
    ButtonSource { button: ButtonType::LeftBlinker, message: catalog::STALKS, signal: "LeftIndicator", value: None },
    ButtonSource { button: ButtonType::RightBlinker, message: catalog::STALKS, signal: "RightIndicator", value: None },
    ButtonSource { button: ButtonType::AccelCruise, message: catalog::PCM_BUTTONS, signal: "BTN_AccUpDown_Cmd", value: Some(2.0) },
    ButtonSource { button: ButtonType::DecelCruise, message: catalog::PCM_BUTTONS, signal: "BTN_AccUpDown_Cmd", value: Some(3.0) },
    ButtonSource { button: ButtonType::Cancel, message: catalog::PCM_BUTTONS, signal: "BTN_AccCancel", value: None },
    ButtonSource { button: ButtonType::SetCruise, message: catalog::PCM_BUTTONS, signal: "SET_BTN", value: None },
    ButtonSource { button: ButtonType::ResumeCruise, message: catalog::PCM_BUTTONS, signal: "RES_BTN", value: None },
    ButtonSource { button: ButtonType::MainCruise, message: catalog::PCM_BUTTONS, signal: "ACC_ON_BTN", value: None },
    ButtonSource { button: ButtonType::LkasToggle, message: catalog::PCM_BUTTONS, signal: "LKAS_ON_BTN", value: None },
];

/// Wheel speeds in km/h
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelSpeeds {
    pub fl: f64,
    pub fr: f64,
    pub bl: f64,
    pub br: f64,
}

/// Stock cruise state as reported by the camera
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CruiseState {
    /// Not faulted
    pub available: Option<bool>,
    pub main_on: Option<bool>,
    /// Stock ACC is controlling speed
    pub stock_active: Option<bool>,
    /// km/h
    pub speed_kph: Option<f64>,
    /// Stock "accel request, not standstill"
    pub accel_request: Option<bool>,
}

/// One snapshot of the vehicle, rebuilt every cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleState {
    pub steering_angle_deg: Option<f64>,
    pub steering_rate_deg: Option<f64>,
    /// Driver torque in raw EPS units
    pub steering_torque: Option<f64>,
    /// Torque the EPS applies, Nm
    pub steering_torque_eps: Option<f64>,
    pub steering_pressed: Option<bool>,
    pub steer_fault: Option<bool>,
    pub steer_warning: Option<bool>,

    pub wheel_speeds: Option<WheelSpeeds>,
    /// m/s
    pub v_ego: Option<f64>,
    pub standstill: Option<bool>,

    pub gas: Option<f64>,
    pub gas_pressed: Option<bool>,
    pub brake: Option<f64>,
    pub brake_pressed: Option<bool>,
    pub brake_hold: Option<bool>,
    pub gear: Option<GearShifter>,

    pub door_open: Option<bool>,
    pub seatbelt_unlatched: Option<bool>,

    pub cruise: CruiseState,
    pub lkas_active: Option<bool>,

    pub left_blinker: Option<bool>,
    pub right_blinker: Option<bool>,
    pub left_blindspot: Option<bool>,
    pub right_blindspot: Option<bool>,

    /// Buttons held right now
    pub buttons: BTreeSet<ButtonType>,
    /// Edges since the previous snapshot
    pub button_events: Vec<ButtonEvent>,
}

impl VehicleState {
    pub fn button_held(&self, button: ButtonType) -> bool {
        self.buttons.contains(&button)
    }
}

/// Frame accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub frames: u64,
    pub decoded: u64,
    /// Same counter as the previous frame, skipped
    pub repeated: u64,
    pub unknown_ids: u64,
    pub malformed: u64,
    pub checksum_mismatches: u64,
}

/// Reads through the polarity/scale overrides
struct Reader<'a> {
    table: &'a SignalTable,
    overrides: &'a [SignalOverride],
}

impl Reader<'_> {
    fn override_for(&self, message: &str, signal: &str) -> Option<&SignalOverride> {
        self.overrides
            .iter()
            .find(|o| o.message == message && o.signal == signal)
    }

    fn value(&self, message: &str, bus: u8, signal: &str) -> Option<f64> {
        let raw = self.table.value(message, bus, signal)?;
        Some(match self.override_for(message, signal) {
            Some(o) => raw * o.scale,
            None => raw,
        })
    }

    fn flag(&self, message: &str, bus: u8, signal: &str) -> Option<bool> {
        let set = self.table.value(message, bus, signal)? != 0.0;
        let inverted = self
            .override_for(message, signal)
            .map_or(false, |o| o.inverted);
        Some(set != inverted)
    }
}

/// OR over the known inputs; `None` only when nothing is known
fn any_set(flags: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
    flags
        .into_iter()
        .flatten()
        .fold(None, |acc, flag| Some(acc.unwrap_or(false) || flag))
}

/// Fuses decoded frames into a vehicle state snapshot
pub struct StateTracker {
    table: SignalTable,
    overrides: Vec<SignalOverride>,
    vehicle: VehicleConfig,
    steering_pressed_threshold: f64,
    button_states: BTreeMap<ButtonType, bool>,
    stats: TrackerStats,
}

impl StateTracker {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            table: SignalTable::new(),
            overrides: config.signals.clone(),
            vehicle: config.vehicle.clone(),
            steering_pressed_threshold: config.steer.steering_pressed_threshold,
            button_states: BTreeMap::new(),
            stats: TrackerStats::default(),
        }
    }

    /// Decode one received frame into the signal table
    ///
    /// Frames that fail to decode are counted and dropped; the table keeps
    /// the last good values.
    pub fn ingest(&mut self, codec: &mut MessageCodec, frame: &CanFrame) {
        self.stats.frames += 1;

        match codec.decode(frame) {
            Ok(decoded) if !decoded.fresh => {
                self.stats.repeated += 1;
                log::trace!("Repeated counter on {} (bus {})", decoded.name, decoded.bus);
            }
            Ok(decoded) => {
                self.stats.decoded += 1;
                self.table.insert(decoded);
            }
            Err(CodecError::UnknownMessageId(id)) => {
                self.stats.unknown_ids += 1;
                log::trace!("Ignoring CAN ID 0x{:X} on bus {}", id, frame.bus());
            }
            Err(e @ CodecError::MalformedFrame { .. }) => {
                self.stats.malformed += 1;
                log::debug!("Dropping frame {}: {}", frame, e);
            }
            Err(e @ CodecError::ChecksumMismatch { .. }) => {
                self.stats.checksum_mismatches += 1;
                log::warn!("Dropping frame {}: {}", frame, e);
            }
            Err(e) => {
                log::warn!("Failed to decode frame {}: {}", frame, e);
            }
        }
    }

    /// Rebuild the vehicle state from the signal table
    pub fn update(&mut self) -> VehicleState {
        use crate::catalog::*;

        let r = Reader {
            table: &self.table,
            overrides: &self.overrides,
        };
        let esc = CanBus::ESC;
        let mpc = CanBus::MPC;

        // A quiet camera must not pin the angle to its last report
        let eps_angle = r.value(STEER_MODULE_2, esc, "STEER_ANGLE_2");
        let adas_angle = r
            .value(STEERING_MODULE_ADAS, mpc, "STEER_ANGLE")
            .filter(|_| r.table.is_fresh(STEERING_MODULE_ADAS, mpc));
        let steering_angle_deg = match adas_angle {
            Some(angle) if angle.abs() > ADAS_ANGLE_DEADBAND => Some(angle),
            _ => eps_angle,
        };

        let steering_torque = r.value(STEER_MODULE_2, esc, "DRIVER_EPS_TORQUE");
        let threshold = self.steering_pressed_threshold;

        let v_ego = self
            .vehicle
            .wheel_speed_signals
            .iter()
            .map(|signal| r.value(WHEEL_SPEED, esc, signal))
            .collect::<Option<Vec<f64>>>()
            .filter(|speeds| !speeds.is_empty())
            .map(|speeds| {
                let mean = speeds.iter().sum::<f64>() / speeds.len() as f64;
                mean * self.vehicle.wheel_speed_factor * KPH_TO_MS
            });

        let gas = r.value(PEDAL, esc, "GAS_PEDAL");
        let brake = r.value(PEDAL, esc, "BRAKE_PEDAL");
        let brake_pressed = any_set([
            r.flag(DRIVE_STATE, esc, "BRAKE_PRESSED"),
            r.flag(PEDAL_PRESSED, esc, "PEDAL_PRESSED_ACTIVE_LOW"),
            brake.map(|b| b > self.vehicle.brake_pressed_threshold),
        ]);

        let acc_on1 = r.flag(ACC_HUD_ADAS, mpc, "ACC_ON1");
        let acc_on2 = r.flag(ACC_HUD_ADAS, mpc, "ACC_ON2");
        let cruise = CruiseState {
            available: r.flag(ACC_HUD_ADAS, mpc, "ACC_FAULT").map(|fault| !fault),
            main_on: acc_on1.zip(acc_on2).map(|(on1, on2)| on1 && on2),
            stock_active: r.flag(ACC_HUD_ADAS, mpc, "ACC_ACTIVE"),
            speed_kph: r.value(ACC_HUD_ADAS, mpc, "SET_SPEED"),
            accel_request: r.flag(ACC_CMD, mpc, "ACC_REQ_NOT_STANDSTILL"),
        };

        let (buttons, button_events) = read_buttons(&r, &mut self.button_states);

        let state = VehicleState {
            steering_angle_deg,
            steering_rate_deg: r.value(STEER_MODULE_2, esc, "STEER_RATE_2"),
            steering_torque,
            steering_torque_eps: r.value(STEERING_TORQUE, esc, "MAIN_TORQUE"),
            steering_pressed: steering_torque.map(|t| t.abs() > threshold),
            steer_fault: any_set([
                r.flag(ACC_EPS_STATE, esc, "TorqueFailed"),
                r.flag(ACC_EPS_STATE, esc, "SteerError_1"),
                r.flag(ACC_EPS_STATE, esc, "SteerError_2"),
            ]),
            steer_warning: r.flag(ACC_EPS_STATE, esc, "SteerWarning"),

            wheel_speeds: wheel_speeds(&r),
            v_ego,
            standstill: v_ego.map(|v| v < STANDSTILL_SPEED),

            gas,
            gas_pressed: gas.map(|g| g > self.vehicle.gas_pressed_threshold),
            brake,
            brake_pressed,
            brake_hold: r.flag(METER_CLUSTER, esc, "BRAKE_HOLD_ACTIVE"),
            gear: r.value(DRIVE_STATE, esc, "GEAR").map(GearShifter::from_raw),

            door_open: any_set([
                r.flag(METER_CLUSTER, esc, "FRONT_LEFT_DOOR"),
                r.flag(METER_CLUSTER, esc, "FRONT_RIGHT_DOOR"),
                r.flag(METER_CLUSTER, esc, "BACK_LEFT_DOOR"),
                r.flag(METER_CLUSTER, esc, "BACK_RIGHT_DOOR"),
            ]),
            seatbelt_unlatched: r.flag(METER_CLUSTER, esc, "SEATBELT_DRIVER").map(|b| !b),

            cruise,
            lkas_active: any_set([
                r.flag(LKAS_HUD_ADAS, mpc, "STEER_ACTIVE_ACTIVE_LOW"),
                r.flag(LKAS_HUD_ADAS, mpc, "STEER_ACTIVE_1_1"),
                r.flag(LKAS_HUD_ADAS, mpc, "STEER_ACTIVE_1_2"),
                r.flag(LKAS_HUD_ADAS, mpc, "STEER_ACTIVE_1_3"),
            ]),

            left_blinker: r.flag(STALKS, esc, "LeftIndicator"),
            right_blinker: r.flag(STALKS, esc, "RightIndicator"),
            left_blindspot: r.flag(BSM, esc, "LEFT_APPROACH"),
            right_blindspot: r.flag(BSM, esc, "RIGHT_APPROACH"),

            buttons,
            button_events,
        };

        self.table.mark_stale();
        state
    }

    pub fn table(&self) -> &SignalTable {
        &self.table
    }

    /// Newest stock values of a message, for builders that pass fields through
    pub fn stock_values(&self, message: &str, bus: u8) -> Option<&SignalValues> {
        self.table.get(message, bus).map(|entry| &entry.values)
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }
}

fn wheel_speeds(r: &Reader<'_>) -> Option<WheelSpeeds> {
    let read = |signal| r.value(catalog::WHEEL_SPEED, CanBus::ESC, signal);
    Some(WheelSpeeds {
        fl: read("WHEELSPEED_FL")?,
        fr: read("WHEELSPEED_FR")?,
        bl: read("WHEELSPEED_BL")?,
        br: read("WHEELSPEED_BR")?,
    })
}

/// Current button levels plus press/release edges against the last call
fn read_buttons(
    r: &Reader<'_>,
    previous: &mut BTreeMap<ButtonType, bool>,
) -> (BTreeSet<ButtonType>, Vec<ButtonEvent>) {
    let mut held = BTreeSet::new();
    let mut events = Vec::new();

    for source in BUTTONS {
        let Some(raw) = r.table.value(source.message, CanBus::ESC, source.signal) else {
            continue;
        };
        let pressed = match source.value {
            Some(code) => raw == code,
            None => raw != 0.0,
        };

        let was_pressed = previous.insert(source.button, pressed).unwrap_or(false);
        if pressed != was_pressed {
            log::debug!("{:?} {}", source.button, if pressed { "pressed" } else { "released" });
            events.push(ButtonEvent {
                button: source.button,
                pressed,
            });
        }
        if pressed {
            held.insert(source.button);
        }
    }

    (held, events)
}
