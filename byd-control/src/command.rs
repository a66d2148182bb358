//! Planner-facing command model
//!
//! A `ControlCommand` is produced fresh every cycle by the planner and
//! consumed once by the controller.

/// Desired actuation for one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlCommand {
    /// Planner wants lateral control
    pub lat_active: bool,
    /// Planner wants longitudinal control
    pub long_active: bool,
    /// Ask the stock cruise to cancel
    pub cancel: bool,
    /// Normalized steering torque request, -1.0 ..= 1.0
    pub steer: f64,
    /// Steering angle request in degrees (angle control only)
    pub steer_angle_deg: f64,
    /// Acceleration request in m/s²
    pub accel: f64,
    pub hud: HudControl,
}

/// Dashboard hints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HudControl {
    pub left_lane_visible: bool,
    pub right_lane_visible: bool,
    pub lead_visible: bool,
    /// Displayed set speed in km/h; zero or negative shows the stock value
    pub set_speed_kph: f64,
    /// Ask the driver to hold the wheel
    pub steer_required_alert: bool,
}

impl ControlCommand {
    /// Lateral-only command with a normalized torque request
    pub fn steer(steer: f64) -> Self {
        Self {
            lat_active: true,
            steer,
            ..Self::default()
        }
    }
}
