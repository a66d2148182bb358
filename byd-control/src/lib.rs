//! BYD Control Core
//!
//! Translates between raw bus frames and the driver-assistance command and
//! state model, one fixed-period control cycle at a time.
//!
//! # Architecture
//!
//! - `StateTracker` folds decoded frames into a `VehicleState` snapshot
//! - `CruiseLatch` resolves engagement from safety inputs and buttons
//! - `TorqueArbiter` rate-limits and driver-override-limits steering torque
//! - `CarController` runs the cycle and encodes the outgoing frames
//!
//! The core is single-threaded and owns all of its state. Bus transport,
//! scheduling and the planner live outside it.
//!
//! # Example Usage
//!
//! ```no_run
//! use byd_control::{CarController, ControlCommand, ControllerConfig};
//!
//! let mut controller = CarController::new(ControllerConfig::atto3()).unwrap();
//!
//! // Once per cycle: newest received frames in, frames to transmit out
//! let output = controller.update(&[], &ControlCommand::steer(0.2));
//! for frame in &output.frames {
//!     println!("{}", frame);
//! }
//! ```

// Public modules
pub mod catalog;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod latch;
pub mod messages;
pub mod state;
pub mod torque;

// Re-export main types for convenience
pub use catalog::CanBus;
pub use command::{ControlCommand, HudControl};
pub use config::{
    load_config, Capabilities, ControllerConfig, LongitudinalConfig, SignalOverride,
    SteerConfig, SteerControlType, VehicleConfig,
};
pub use controller::{CarController, CycleOutput, OutgoingFrameSet};
pub use error::{ConfigError, ControlError, Result};
pub use latch::{CruiseLatch, DisengageReason, LatchInputs, LatchState};
pub use state::{
    ButtonEvent, ButtonType, CruiseState, GearShifter, SignalTable, StateTracker,
    TrackerStats, VehicleState, WheelSpeeds,
};
pub use torque::{next_torque, SteerLimits, TorqueArbiter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
