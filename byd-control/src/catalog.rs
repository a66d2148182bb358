//! Message catalogue
//!
//! Names of the dictionary messages the controller reads and writes, and the
//! logical buses they travel on. Layouts live in the DBC dictionary only.

/// Logical bus indices as seen by the harness
pub struct CanBus;

impl CanBus {
    /// Powertrain side: ESC, EPS, BCM
    pub const ESC: u8 = 0;
    /// ADAS camera side
    pub const MPC: u8 = 2;
}

pub const STEER_MODULE_2: &str = "STEER_MODULE_2";
pub const WHEEL_SPEED: &str = "WHEEL_SPEED";
pub const STALKS: &str = "STALKS";
pub const STEERING_MODULE_ADAS: &str = "STEERING_MODULE_ADAS";
pub const STEERING_TORQUE: &str = "STEERING_TORQUE";
pub const PEDAL_PRESSED: &str = "PEDAL_PRESSED";
pub const DRIVE_STATE: &str = "DRIVE_STATE";
pub const METER_CLUSTER: &str = "METER_CLUSTER";
pub const LKAS_HUD_ADAS: &str = "LKAS_HUD_ADAS";
pub const ACC_EPS_STATE: &str = "ACC_EPS_STATE";
pub const ACC_HUD_ADAS: &str = "ACC_HUD_ADAS";
pub const ACC_CMD: &str = "ACC_CMD";
pub const PEDAL: &str = "PEDAL";
pub const PCM_BUTTONS: &str = "PCM_BUTTONS";
pub const BSM: &str = "BSM";

/// Messages the state tracker reads, with the bus they are read from
pub const RX_MESSAGES: &[(&str, u8)] = &[
    (STEER_MODULE_2, CanBus::ESC),
    (WHEEL_SPEED, CanBus::ESC),
    (STALKS, CanBus::ESC),
    (STEERING_MODULE_ADAS, CanBus::MPC),
    (STEERING_TORQUE, CanBus::ESC),
    (PEDAL_PRESSED, CanBus::ESC),
    (DRIVE_STATE, CanBus::ESC),
    (METER_CLUSTER, CanBus::ESC),
    (LKAS_HUD_ADAS, CanBus::MPC),
    (ACC_EPS_STATE, CanBus::ESC),
    (ACC_HUD_ADAS, CanBus::MPC),
    (ACC_CMD, CanBus::MPC),
    (PEDAL, CanBus::ESC),
    (PCM_BUTTONS, CanBus::ESC),
    (BSM, CanBus::ESC),
];

/// Messages the controller transmits, with their destination bus
pub const TX_MESSAGES: &[(&str, u8)] = &[
    (STEERING_MODULE_ADAS, CanBus::ESC),
    (ACC_CMD, CanBus::ESC),
    (LKAS_HUD_ADAS, CanBus::ESC),
    (ACC_HUD_ADAS, CanBus::ESC),
    (ACC_EPS_STATE, CanBus::MPC),
];
