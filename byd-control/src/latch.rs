//! Cruise engagement latch
//!
//! Resolves the redundant and sometimes contradictory engagement signals
//! into one decision per cycle. Rules, highest precedence first:
//!
//! 1. Safety disengage: door open, seatbelt unlatched, brake hold, brake
//!    pressed, stock ACC off or cruise unavailable. An unknown safety input
//!    counts as unsafe.
//! 2. Override engage: the stock "accel request, not standstill" flag.
//! 3. Button engage: SET or RESUME held with the brake released.
//! 4. Otherwise the state is unchanged.

use crate::state::{ButtonType, VehicleState};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LatchState {
    #[default]
    Disengaged,
    Engaged,
}

impl LatchState {
    pub fn is_engaged(self) -> bool {
        self == LatchState::Engaged
    }
}

/// Why rule 1 fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisengageReason {
    DoorOpen,
    SeatbeltUnlatched,
    BrakeHold,
    BrakePressed,
    StockAccOff,
    CruiseUnavailable,
    /// A safety input has not been received yet
    UnknownInput(&'static str),
}

impl fmt::Display for DisengageReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisengageReason::DoorOpen => write!(f, "door open"),
            DisengageReason::SeatbeltUnlatched => write!(f, "seatbelt unlatched"),
            DisengageReason::BrakeHold => write!(f, "brake hold active"),
            DisengageReason::BrakePressed => write!(f, "brake pressed"),
            DisengageReason::StockAccOff => write!(f, "stock ACC off"),
            DisengageReason::CruiseUnavailable => write!(f, "cruise unavailable"),
            DisengageReason::UnknownInput(name) => write!(f, "{} unknown", name),
        }
    }
}

/// Inputs of one latch evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatchInputs {
    pub door_open: Option<bool>,
    pub seatbelt_unlatched: Option<bool>,
    pub brake_hold: Option<bool>,
    pub brake_pressed: Option<bool>,
    pub acc_main_on: Option<bool>,
    pub cruise_available: Option<bool>,
    pub accel_request: Option<bool>,
    pub set_pressed: bool,
    pub resume_pressed: bool,
}

impl LatchInputs {
    pub fn from_state(state: &VehicleState) -> Self {
        Self {
            door_open: state.door_open,
            seatbelt_unlatched: state.seatbelt_unlatched,
            brake_hold: state.brake_hold,
            brake_pressed: state.brake_pressed,
            acc_main_on: state.cruise.main_on,
            cruise_available: state.cruise.available,
            accel_request: state.cruise.accel_request,
            set_pressed: state.button_held(ButtonType::SetCruise),
            resume_pressed: state.button_held(ButtonType::ResumeCruise),
        }
    }

    /// First safety condition that forbids engagement
    pub fn safety_violation(&self) -> Option<DisengageReason> {
        let checks = [
            (self.door_open, true, DisengageReason::DoorOpen, "door"),
            (self.seatbelt_unlatched, true, DisengageReason::SeatbeltUnlatched, "seatbelt"),
            (self.brake_hold, true, DisengageReason::BrakeHold, "brake hold"),
            (self.brake_pressed, true, DisengageReason::BrakePressed, "brake"),
            (self.acc_main_on, false, DisengageReason::StockAccOff, "ACC main switch"),
            (self.cruise_available, false, DisengageReason::CruiseUnavailable, "cruise availability"),
        ];

        checks.into_iter().find_map(|(input, unsafe_when, reason, name)| match input {
            None => Some(DisengageReason::UnknownInput(name)),
            Some(value) if value == unsafe_when => Some(reason),
            Some(_) => None,
        })
    }
}

/// Persistent engagement state machine
#[derive(Debug, Default)]
pub struct CruiseLatch {
    state: LatchState,
    last_reason: Option<DisengageReason>,
}

impl CruiseLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LatchState {
        self.state
    }

    pub fn enabled(&self) -> bool {
        self.state.is_engaged()
    }

    /// Reason behind the most recent safety disengage, if rule 1 fired on
    /// the last evaluation
    pub fn last_reason(&self) -> Option<DisengageReason> {
        self.last_reason
    }

    /// Evaluate one cycle
    pub fn update(&mut self, inputs: &LatchInputs) -> LatchState {
        self.last_reason = inputs.safety_violation();

        let next = if self.last_reason.is_some() {
            LatchState::Disengaged
        } else if inputs.accel_request == Some(true) {
            LatchState::Engaged
        } else if (inputs.set_pressed || inputs.resume_pressed) && inputs.brake_pressed == Some(false) {
            LatchState::Engaged
        } else {
            self.state
        };

        if next != self.state {
            match (next, self.last_reason) {
                (LatchState::Disengaged, Some(reason)) => log::info!("Cruise disengaged: {}", reason),
                (LatchState::Disengaged, None) => log::info!("Cruise disengaged"),
                (LatchState::Engaged, _) => log::info!("Cruise engaged"),
            }
        }

        self.state = next;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn safe() -> LatchInputs {
        LatchInputs {
            door_open: Some(false),
            seatbelt_unlatched: Some(false),
            brake_hold: Some(false),
            brake_pressed: Some(false),
            acc_main_on: Some(true),
            cruise_available: Some(true),
            accel_request: Some(false),
            set_pressed: false,
            resume_pressed: false,
        }
    }

    #[test]
    fn test_initially_disengaged() {
        let latch = CruiseLatch::new();
        assert_eq!(latch.state(), LatchState::Disengaged);
        assert!(!latch.enabled());
    }

    #[test]
    fn test_resume_then_brake() {
        let mut latch = CruiseLatch::new();

        let resume = LatchInputs { resume_pressed: true, ..safe() };
        assert_eq!(latch.update(&resume), LatchState::Engaged);

        let brake = LatchInputs { brake_pressed: Some(true), ..safe() };
        assert_eq!(latch.update(&brake), LatchState::Disengaged);
        assert_eq!(latch.last_reason(), Some(DisengageReason::BrakePressed));
    }

    #[test]
    fn test_engaged_state_persists() {
        let mut latch = CruiseLatch::new();
        latch.update(&LatchInputs { set_pressed: true, ..safe() });
        assert_eq!(latch.update(&safe()), LatchState::Engaged);
        assert_eq!(latch.update(&safe()), LatchState::Engaged);
    }

    #[test]
    fn test_door_open_blocks_buttons() {
        let mut latch = CruiseLatch::new();
        latch.update(&LatchInputs { set_pressed: true, ..safe() });

        let door = LatchInputs { door_open: Some(true), ..safe() };
        assert_eq!(latch.update(&door), LatchState::Disengaged);

        let door_and_set = LatchInputs { set_pressed: true, resume_pressed: true, ..door };
        assert_eq!(latch.update(&door_and_set), LatchState::Disengaged);
        assert_eq!(latch.update(&door_and_set), LatchState::Disengaged);
        assert_eq!(latch.last_reason(), Some(DisengageReason::DoorOpen));
    }

    #[test]
    fn test_override_engage() {
        let mut latch = CruiseLatch::new();
        let request = LatchInputs { accel_request: Some(true), ..safe() };
        assert_eq!(latch.update(&request), LatchState::Engaged);
    }

    #[test]
    fn test_safety_beats_override() {
        let mut latch = CruiseLatch::new();
        let conflict = LatchInputs {
            accel_request: Some(true),
            seatbelt_unlatched: Some(true),
            ..safe()
        };
        assert_eq!(latch.update(&conflict), LatchState::Disengaged);
    }

    #[test]
    fn test_unknown_safety_input_disengages() {
        let mut latch = CruiseLatch::new();
        latch.update(&LatchInputs { set_pressed: true, ..safe() });

        let unknown = LatchInputs { brake_hold: None, ..safe() };
        assert_eq!(latch.update(&unknown), LatchState::Disengaged);
        assert_eq!(
            latch.last_reason(),
            Some(DisengageReason::UnknownInput("brake hold"))
        );
    }

    #[test]
    fn test_stock_acc_off_and_fault() {
        let off = LatchInputs { acc_main_on: Some(false), ..safe() };
        assert_eq!(off.safety_violation(), Some(DisengageReason::StockAccOff));

        let fault = LatchInputs { cruise_available: Some(false), ..safe() };
        assert_eq!(fault.safety_violation(), Some(DisengageReason::CruiseUnavailable));

        assert_eq!(safe().safety_violation(), None);
    }

    #[test]
    fn test_precedence_follows_rule_order() {
        let inputs = LatchInputs {
            door_open: Some(true),
            brake_pressed: Some(true),
            ..safe()
        };
        assert_eq!(inputs.safety_violation(), Some(DisengageReason::DoorOpen));
    }
}
