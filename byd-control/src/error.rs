//! Error types for the control core
//!
//! Only construction can fail. Once a controller exists, per-cycle problems
//! are logged and degrade to the last known value.

use byd_can::CodecError;

/// Result type for controller construction
pub type Result<T> = std::result::Result<T, ControlError>;

/// Fatal startup errors
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration rejected by validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("steer.{field} must be positive, got {value}")]
    NonPositiveLimit { field: &'static str, value: f64 },

    #[error("{field} must be a finite non-negative number, got {value}")]
    InvalidThreshold { field: &'static str, value: f64 },

    #[error("vehicle.wheel_speed_factor must be positive, got {0}")]
    InvalidWheelSpeedFactor(f64),

    #[error("vehicle.wheel_speed_signals needs 3 or 4 entries, got {0}")]
    WheelSpeedSignalCount(usize),

    #[error("vehicle.wheel_speed_signals names '{0}', which WHEEL_SPEED does not carry")]
    UnknownWheelSpeedSignal(String),

    #[error("longitudinal.min_accel ({min}) exceeds longitudinal.max_accel ({max})")]
    InvalidAccelRange { min: f64, max: f64 },

    #[error("signal override {message}.{signal} does not exist in the dictionary")]
    UnknownOverride { message: String, signal: String },

    #[error("signal override {message}.{signal} has invalid scale {scale}")]
    InvalidScale {
        message: String,
        signal: String,
        scale: f64,
    },
}
