//! Steering torque arbitration
//!
//! Every commanded torque passes through a rate limit and then a
//! driver-override envelope before it reaches the EPS. With the limits in
//! force the applied torque can never step by more than the configured
//! deltas nor leave `[-max, max]`.

use serde::{Deserialize, Serialize};

/// Torque limits, all in raw EPS torque units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SteerLimits {
    /// Largest torque magnitude ever applied
    pub max: i32,
    /// Largest increase per cycle
    pub delta_up: i32,
    /// Largest decrease per cycle
    pub delta_down: i32,
    /// Driver torque tolerated before the envelope starts to shrink
    pub driver_allowance: f64,
    /// Envelope shrink per unit of driver torque beyond the allowance
    pub driver_multiplier: f64,
}

impl SteerLimits {
    /// Largest torque magnitude allowed while the driver applies `driver_torque`
    ///
    /// Shrinks linearly once the driver exceeds the allowance and reaches
    /// zero at `driver_allowance + max / driver_multiplier`.
    pub fn envelope(&self, driver_torque: f64) -> f64 {
        let driver = driver_torque.abs();
        let max = f64::from(self.max);

        if driver > self.driver_allowance {
            (max - (driver - self.driver_allowance) * self.driver_multiplier).max(0.0)
        } else {
            max
        }
    }

    /// Driver torque at which the envelope collapses to zero
    pub fn collapse_torque(&self) -> f64 {
        self.driver_allowance + f64::from(self.max) / self.driver_multiplier
    }
}

/// Compute the torque to apply this cycle
///
/// 1. Clamp `requested` to `[last - delta_down, last + delta_up]`.
/// 2. Clamp to the driver-override envelope.
/// 3. Round to the nearest integer.
///
/// A NaN request holds the last applied torque.
pub fn next_torque(requested: f64, last_applied: i32, driver_torque: f64, limits: &SteerLimits) -> i32 {
    let last = f64::from(last_applied);
    let requested = if requested.is_nan() { last } else { requested };

    let rate_limited = requested.clamp(
        last - f64::from(limits.delta_down),
        last + f64::from(limits.delta_up),
    );

    let allowed = limits.envelope(driver_torque);
    rate_limited.clamp(-allowed, allowed).round() as i32
}

/// Stateful wrapper remembering the last applied torque
#[derive(Debug, Clone)]
pub struct TorqueArbiter {
    limits: SteerLimits,
    last_applied: i32,
}

impl TorqueArbiter {
    pub fn new(limits: SteerLimits) -> Self {
        Self {
            limits,
            last_applied: 0,
        }
    }

    /// Arbitrate one request and remember the result
    pub fn apply(&mut self, requested: f64, driver_torque: f64) -> i32 {
        self.last_applied = next_torque(requested, self.last_applied, driver_torque, &self.limits);
        self.last_applied
    }

    /// Drop to zero torque, used whenever steering is not requested
    pub fn reset(&mut self) {
        self.last_applied = 0;
    }

    pub fn last_applied(&self) -> i32 {
        self.last_applied
    }

    pub fn limits(&self) -> &SteerLimits {
        &self.limits
    }
}
