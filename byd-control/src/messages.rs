//! Outgoing message builders
//!
//! Each builder returns the named field values of one message; the codec
//! packs them and adds counter and checksum. Builders that start from a
//! stock message copy its fields first and then override what they own.

use crate::command::HudControl;
use crate::config::SteerControlType;
use byd_can::SignalValues;

/// Steering command (STEERING_MODULE_ADAS)
pub fn steering_command(
    control_type: SteerControlType,
    torque: i32,
    angle_deg: f64,
    steer_req: bool,
) -> SignalValues {
    let mut values = SignalValues::new();
    values
        .set_flag("STEER_REQ", steer_req)
        .set_flag("STEER_REQ_ACTIVE_LOW", !steer_req)
        .set_flag("HANDS_ON_REQ", false);

    match control_type {
        SteerControlType::Torque => {
            values
                .set("LKAS_OUTPUT", if steer_req { f64::from(torque) } else { 0.0 })
                .set("STEER_ANGLE", 0.0);
        }
        SteerControlType::Angle => {
            values
                .set("LKAS_OUTPUT", 0.0)
                .set("STEER_ANGLE", if steer_req { angle_deg } else { 0.0 });
        }
    }

    values
}

/// Longitudinal command (ACC_CMD)
pub fn acc_command(accel: f64, active: bool, standstill: bool) -> SignalValues {
    let mut values = SignalValues::new();
    values
        .set("ACCEL_CMD", if active { accel } else { 0.0 })
        .set_flag("ACC_CONTROL_ACTIVE", active)
        .set_flag("ACC_REQ_NOT_STANDSTILL", active && !standstill)
        .set_flag("ACC_OVERRIDE_OR_STANDSTILL", active && standstill)
        .set_flag("STANDSTILL_STATE", active && standstill)
        .set_flag("RESUME_FROM_STANDSTILL", false)
        .set_flag("SETME1_0x1", true)
        .set("SETME2_0xF", 15.0);
    values
}

/// Lane-keep HUD (LKAS_HUD_ADAS)
pub fn lkas_hud(stock: Option<&SignalValues>, active: bool, hud: &HudControl) -> SignalValues {
    let mut values = stock.cloned().unwrap_or_default();
    values
        .set_flag("STEER_ACTIVE_ACTIVE_LOW", !active)
        .set_flag("STEER_ACTIVE_1_1", active)
        .set_flag("STEER_ACTIVE_1_2", active)
        .set_flag("STEER_ACTIVE_1_3", active)
        .set_flag("LEFT_LANE", hud.left_lane_visible)
        .set_flag("RIGHT_LANE", hud.right_lane_visible)
        .set_flag("HANDS_ON_WHEEL_WARNING", hud.steer_required_alert);
    values
}

/// Cruise HUD (ACC_HUD_ADAS)
pub fn acc_hud(
    stock: Option<&SignalValues>,
    main_on: bool,
    active: bool,
    set_speed_kph: f64,
    lead_visible: bool,
) -> SignalValues {
    let mut values = stock.cloned().unwrap_or_default();
    values
        .set_flag("ACC_ON1", main_on)
        .set_flag("ACC_ON2", main_on)
        .set_flag("ACC_ACTIVE", active)
        .set_flag("LEAD_VISIBLE", lead_visible)
        .set("SET_SPEED", set_speed_kph.max(0.0));
    values
}

/// Synthetic EPS feedback (ACC_EPS_STATE towards the camera)
///
/// Compatibility shim: the camera keeps monitoring the EPS while the
/// controller steers, so the stock frame is echoed with the applied torque
/// reported as EPS output. `stock` is the newest ACC_EPS_STATE from the EPS.
pub fn synthetic_eps_feedback(
    stock: &SignalValues,
    applied_torque: i32,
    enabled: bool,
    lkas_active: bool,
    lkas_prepare: bool,
) -> SignalValues {
    let mut values = stock.clone();
    values.set_flag("ReportHandsNotOnSteeringWheel", false);

    if enabled {
        let (prepared, activated, torque) = if lkas_active {
            (false, true, f64::from(applied_torque))
        } else if lkas_prepare {
            (true, false, 0.0)
        } else {
            (false, false, 0.0)
        };
        values
            .set_flag("LKAS_Prepared", prepared)
            .set_flag("CruiseActivated", activated)
            .set("MainTorque", torque);
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steering_command_torque_mode() {
        let active = steering_command(SteerControlType::Torque, -120, 5.0, true);
        assert_eq!(active.get("LKAS_OUTPUT"), Some(-120.0));
        assert_eq!(active.flag("STEER_REQ"), Some(true));
        assert_eq!(active.flag("STEER_REQ_ACTIVE_LOW"), Some(false));
        assert_eq!(active.get("STEER_ANGLE"), Some(0.0));

        let idle = steering_command(SteerControlType::Torque, -120, 5.0, false);
        assert_eq!(idle.get("LKAS_OUTPUT"), Some(0.0));
        assert_eq!(idle.flag("STEER_REQ_ACTIVE_LOW"), Some(true));
    }

    #[test]
    fn test_steering_command_angle_mode() {
        let values = steering_command(SteerControlType::Angle, 50, -7.5, true);
        assert_eq!(values.get("STEER_ANGLE"), Some(-7.5));
        assert_eq!(values.get("LKAS_OUTPUT"), Some(0.0));
    }

    #[test]
    fn test_acc_command() {
        let moving = acc_command(1.2, true, false);
        assert_eq!(moving.get("ACCEL_CMD"), Some(1.2));
        assert_eq!(moving.flag("ACC_REQ_NOT_STANDSTILL"), Some(true));
        assert_eq!(moving.flag("STANDSTILL_STATE"), Some(false));

        let inactive = acc_command(1.2, false, true);
        assert_eq!(inactive.get("ACCEL_CMD"), Some(0.0));
        assert_eq!(inactive.flag("ACC_CONTROL_ACTIVE"), Some(false));
        assert_eq!(inactive.flag("STANDSTILL_STATE"), Some(false));
    }

    #[test]
    fn test_lkas_hud_keeps_stock_fields() {
        let mut stock = SignalValues::new();
        stock.set("LKAS_CONFIG", 2.0).set_flag("STEER_ACTIVE_1_1", true);
        let hud = HudControl {
            left_lane_visible: true,
            ..HudControl::default()
        };

        let values = lkas_hud(Some(&stock), false, &hud);
        assert_eq!(values.get("LKAS_CONFIG"), Some(2.0));
        assert_eq!(values.flag("STEER_ACTIVE_1_1"), Some(false));
        assert_eq!(values.flag("STEER_ACTIVE_ACTIVE_LOW"), Some(true));
        assert_eq!(values.flag("LEFT_LANE"), Some(true));
        assert_eq!(values.flag("RIGHT_LANE"), Some(false));
    }

    #[test]
    fn test_synthetic_feedback() {
        let mut stock = SignalValues::new();
        stock
            .set("MainTorque", 12.0)
            .set_flag("ReportHandsNotOnSteeringWheel", true)
            .set("SETME4_0x3", 3.0);

        let active = synthetic_eps_feedback(&stock, 150, true, true, false);
        assert_eq!(active.get("MainTorque"), Some(150.0));
        assert_eq!(active.flag("CruiseActivated"), Some(true));
        assert_eq!(active.flag("LKAS_Prepared"), Some(false));
        assert_eq!(active.flag("ReportHandsNotOnSteeringWheel"), Some(false));
        assert_eq!(active.get("SETME4_0x3"), Some(3.0));

        let prepare = synthetic_eps_feedback(&stock, 150, true, false, true);
        assert_eq!(prepare.get("MainTorque"), Some(0.0));
        assert_eq!(prepare.flag("LKAS_Prepared"), Some(true));

        // Disabled: stock torque passes through
        let passthrough = synthetic_eps_feedback(&stock, 150, false, true, false);
        assert_eq!(passthrough.get("MainTorque"), Some(12.0));
        assert_eq!(passthrough.flag("ReportHandsNotOnSteeringWheel"), Some(false));
    }
}
