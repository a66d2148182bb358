//! Controller configuration
//!
//! One table selected at startup covers everything that differs between
//! hardware revisions: torque limits, thresholds, signal polarity and scale,
//! and the capability flags. Loaded from TOML.

use crate::catalog;
use crate::error::ConfigError;
use crate::torque::SteerLimits;
use anyhow::Context;
use byd_can::{CodecConfig, SignalDatabase};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete controller configuration (loaded from a TOML file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub steer: SteerConfig,
    #[serde(default)]
    pub longitudinal: LongitudinalConfig,
    #[serde(default)]
    pub vehicle: VehicleConfig,
    /// Polarity and scale overrides, `[[signal]]` in TOML
    #[serde(default, rename = "signal")]
    pub signals: Vec<SignalOverride>,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub codec: CodecConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SteerControlType {
    #[default]
    Torque,
    Angle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteerConfig {
    #[serde(default)]
    pub control_type: SteerControlType,
    #[serde(flatten)]
    pub limits: SteerLimits,
    /// Driver torque above which the wheel counts as held; required because
    /// it depends on the torque sensor's scaling
    pub steering_pressed_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalConfig {
    #[serde(default)]
    pub enabled: bool,
    /// m/s²
    #[serde(default = "default_max_accel")]
    pub max_accel: f64,
    /// m/s²
    #[serde(default = "default_min_accel")]
    pub min_accel: f64,
}

fn default_max_accel() -> f64 {
    2.0
}

fn default_min_accel() -> f64 {
    -3.5
}

impl Default for LongitudinalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_accel: default_max_accel(),
            min_accel: default_min_accel(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    /// WHEEL_SPEED signals averaged into the vehicle speed
    #[serde(default = "default_wheel_speed_signals")]
    pub wheel_speed_signals: Vec<String>,
    /// Calibration applied to the wheel-speed mean
    #[serde(default = "default_wheel_speed_factor")]
    pub wheel_speed_factor: f64,
    /// Brake pedal position above which the brake counts as pressed
    #[serde(default = "default_pedal_threshold")]
    pub brake_pressed_threshold: f64,
    /// Gas pedal position above which the gas counts as pressed
    #[serde(default = "default_pedal_threshold")]
    pub gas_pressed_threshold: f64,
}

fn default_wheel_speed_signals() -> Vec<String> {
    ["WHEELSPEED_FL", "WHEELSPEED_FR", "WHEELSPEED_BL", "WHEELSPEED_BR"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_wheel_speed_factor() -> f64 {
    1.0
}

fn default_pedal_threshold() -> f64 {
    0.05
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            wheel_speed_signals: default_wheel_speed_signals(),
            wheel_speed_factor: default_wheel_speed_factor(),
            brake_pressed_threshold: default_pedal_threshold(),
            gas_pressed_threshold: default_pedal_threshold(),
        }
    }
}

/// Per-signal polarity and scale correction
///
/// `inverted` flips the signal when it is read as a flag; `scale`
/// multiplies it when it is read as a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOverride {
    pub message: String,
    pub signal: String,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl SignalOverride {
    /// An override that only flips polarity
    pub fn inverted(message: &str, signal: &str) -> Self {
        Self {
            message: message.to_string(),
            signal: signal.to_string(),
            inverted: true,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Compatibility shim: re-send ACC_EPS_STATE towards the camera with an
    /// invented torque feedback so its own monitoring stays satisfied
    #[serde(default)]
    pub synthetic_eps_feedback: bool,
}

impl ControllerConfig {
    /// Stock ATTO3 deployment
    pub fn atto3() -> Self {
        Self {
            steer: SteerConfig {
                control_type: SteerControlType::Torque,
                limits: SteerLimits {
                    max: 300,
                    delta_up: 17,
                    delta_down: 17,
                    driver_allowance: 68.0,
                    driver_multiplier: 3.0,
                },
                steering_pressed_threshold: 3.0,
            },
            longitudinal: LongitudinalConfig::default(),
            vehicle: VehicleConfig {
                // HUD odometer calibration
                wheel_speed_factor: 0.718,
                ..VehicleConfig::default()
            },
            signals: vec![
                SignalOverride::inverted(catalog::PEDAL_PRESSED, "PEDAL_PRESSED_ACTIVE_LOW"),
                SignalOverride::inverted(catalog::LKAS_HUD_ADAS, "STEER_ACTIVE_ACTIVE_LOW"),
            ],
            capabilities: Capabilities::default(),
            codec: CodecConfig::default(),
        }
    }

    /// Builder method: enable longitudinal control
    pub fn with_longitudinal(mut self, enabled: bool) -> Self {
        self.longitudinal.enabled = enabled;
        self
    }

    /// Builder method: enable the synthetic EPS feedback shim
    pub fn with_synthetic_eps_feedback(mut self, enabled: bool) -> Self {
        self.capabilities.synthetic_eps_feedback = enabled;
        self
    }

    /// Check the rules that need no signal dictionary
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.steer.limits;
        for (field, value) in [
            ("max", f64::from(limits.max)),
            ("delta_up", f64::from(limits.delta_up)),
            ("delta_down", f64::from(limits.delta_down)),
            ("driver_multiplier", limits.driver_multiplier),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositiveLimit { field, value });
            }
        }

        for (field, value) in [
            ("steer.driver_allowance", limits.driver_allowance),
            ("steer.steering_pressed_threshold", self.steer.steering_pressed_threshold),
            ("vehicle.brake_pressed_threshold", self.vehicle.brake_pressed_threshold),
            ("vehicle.gas_pressed_threshold", self.vehicle.gas_pressed_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { field, value });
            }
        }

        let factor = self.vehicle.wheel_speed_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ConfigError::InvalidWheelSpeedFactor(factor));
        }

        let count = self.vehicle.wheel_speed_signals.len();
        if !(3..=4).contains(&count) {
            return Err(ConfigError::WheelSpeedSignalCount(count));
        }

        let long = &self.longitudinal;
        if !(long.min_accel <= long.max_accel) {
            return Err(ConfigError::InvalidAccelRange {
                min: long.min_accel,
                max: long.max_accel,
            });
        }

        for o in &self.signals {
            if !o.scale.is_finite() || o.scale == 0.0 {
                return Err(ConfigError::InvalidScale {
                    message: o.message.clone(),
                    signal: o.signal.clone(),
                    scale: o.scale,
                });
            }
        }

        Ok(())
    }

    /// Check every signal name the configuration mentions against the
    /// dictionary
    pub fn validate_signals(&self, db: &SignalDatabase) -> Result<(), ConfigError> {
        let wheel_speed = db.get_message_by_name(catalog::WHEEL_SPEED);
        for name in &self.vehicle.wheel_speed_signals {
            if wheel_speed.and_then(|m| m.signal(name)).is_none() {
                return Err(ConfigError::UnknownWheelSpeedSignal(name.clone()));
            }
        }

        for o in &self.signals {
            let known = db
                .get_message_by_name(&o.message)
                .and_then(|m| m.signal(&o.signal))
                .is_some();
            if !known {
                return Err(ConfigError::UnknownOverride {
                    message: o.message.clone(),
                    signal: o.signal.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> anyhow::Result<ControllerConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: ControllerConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    log::info!("Loaded controller config from {:?}", path);
    Ok(config)
}
