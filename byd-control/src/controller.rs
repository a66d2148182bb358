//! Control loop
//!
//! `CarController` owns every piece of mutable state: codec counters, the
//! signal table, the cruise latch and the last applied torque. One call to
//! `update` is one control cycle: ingest frames, rebuild the vehicle state,
//! evaluate the latch, arbitrate torque and encode the outgoing frames.

use crate::catalog::{self, CanBus};
use crate::command::{ControlCommand, HudControl};
use crate::config::{ControllerConfig, SteerControlType};
use crate::error::Result;
use crate::latch::{CruiseLatch, LatchInputs};
use crate::messages;
use crate::state::{StateTracker, VehicleState};
use crate::torque::TorqueArbiter;
use byd_can::{CanFrame, MessageCodec, SignalValues};

/// Frames produced by one cycle, in transmission order
pub type OutgoingFrameSet = Vec<CanFrame>;

/// Result of one control cycle
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub state: VehicleState,
    /// Cruise latch engaged
    pub enabled: bool,
    /// Steering requested from the EPS this cycle
    pub steer_req: bool,
    /// Torque sent to the EPS (0 unless steering is requested)
    pub applied_torque: i32,
    /// Acceleration sent in ACC_CMD, m/s²
    pub accel: f64,
    pub frames: OutgoingFrameSet,
}

pub struct CarController {
    config: ControllerConfig,
    codec: MessageCodec,
    tracker: StateTracker,
    latch: CruiseLatch,
    arbiter: TorqueArbiter,
    cycles: u64,
}

impl CarController {
    /// Build a controller, resolving every message and signal it will use
    ///
    /// All configuration and dictionary problems surface here; `update`
    /// never fails.
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;

        let codec = MessageCodec::byd(config.codec.clone())?;
        config.validate_signals(codec.database())?;

        for (name, _) in catalog::RX_MESSAGES.iter().chain(catalog::TX_MESSAGES) {
            codec.message(name)?;
        }

        // Dry-run every builder so a field the dictionary lacks is caught now
        let hud = HudControl::default();
        let empty = SignalValues::new();
        codec.check_fields(
            catalog::STEERING_MODULE_ADAS,
            &messages::steering_command(config.steer.control_type, 0, 0.0, true),
        )?;
        codec.check_fields(catalog::ACC_CMD, &messages::acc_command(0.0, true, false))?;
        codec.check_fields(catalog::LKAS_HUD_ADAS, &messages::lkas_hud(None, true, &hud))?;
        codec.check_fields(
            catalog::ACC_HUD_ADAS,
            &messages::acc_hud(None, true, true, 0.0, false),
        )?;
        codec.check_fields(
            catalog::ACC_EPS_STATE,
            &messages::synthetic_eps_feedback(&empty, 0, true, true, false),
        )?;

        let stats = codec.database_stats();
        log::info!(
            "Controller ready: {} messages, {} signals, {:?} steering, longitudinal {}",
            stats.num_messages,
            stats.num_signals,
            config.steer.control_type,
            if config.longitudinal.enabled { "on" } else { "off" }
        );
        if config.capabilities.synthetic_eps_feedback {
            log::info!("Synthetic EPS feedback enabled");
        }

        Ok(Self {
            tracker: StateTracker::new(&config),
            arbiter: TorqueArbiter::new(config.steer.limits),
            latch: CruiseLatch::new(),
            codec,
            config,
            cycles: 0,
        })
    }

    /// Run one control cycle
    pub fn update(&mut self, frames: &[CanFrame], command: &ControlCommand) -> CycleOutput {
        self.cycles += 1;

        for frame in frames {
            self.tracker.ingest(&mut self.codec, frame);
        }
        let state = self.tracker.update();

        let enabled = self.latch.update(&LatchInputs::from_state(&state)).is_engaged();

        // Steering needs a healthy EPS and a known driver torque
        let driver_torque = state.steering_torque;
        let steer_req = enabled
            && command.lat_active
            && state.steer_fault == Some(false)
            && driver_torque.is_some();

        let applied_torque = match (steer_req, self.config.steer.control_type, driver_torque) {
            (true, SteerControlType::Torque, Some(driver)) => {
                let max = f64::from(self.config.steer.limits.max);
                let requested = command.steer.clamp(-1.0, 1.0) * max;
                self.arbiter.apply(requested, driver)
            }
            _ => {
                self.arbiter.reset();
                0
            }
        };

        let long = self.config.longitudinal.clone();
        let long_active = long.enabled && enabled && command.long_active && !command.cancel;
        let accel = if long_active {
            command.accel.clamp(long.min_accel, long.max_accel)
        } else {
            0.0
        };

        let mut out = OutgoingFrameSet::new();

        let steering = messages::steering_command(
            self.config.steer.control_type,
            applied_torque,
            command.steer_angle_deg,
            steer_req,
        );
        self.encode(catalog::STEERING_MODULE_ADAS, CanBus::ESC, &steering, &mut out);

        if long.enabled {
            let acc = messages::acc_command(accel, long_active, state.standstill.unwrap_or(false));
            self.encode(catalog::ACC_CMD, CanBus::ESC, &acc, &mut out);
        }

        let lkas = messages::lkas_hud(
            self.tracker.stock_values(catalog::LKAS_HUD_ADAS, CanBus::MPC),
            enabled && steer_req,
            &command.hud,
        );
        self.encode(catalog::LKAS_HUD_ADAS, CanBus::ESC, &lkas, &mut out);

        if long.enabled {
            let set_speed = if command.hud.set_speed_kph > 0.0 {
                command.hud.set_speed_kph
            } else {
                state.cruise.speed_kph.unwrap_or(0.0)
            };
            let acc_hud = messages::acc_hud(
                self.tracker.stock_values(catalog::ACC_HUD_ADAS, CanBus::MPC),
                state.cruise.main_on.unwrap_or(false),
                long_active,
                set_speed,
                command.hud.lead_visible,
            );
            self.encode(catalog::ACC_HUD_ADAS, CanBus::ESC, &acc_hud, &mut out);
        }

        if self.config.capabilities.synthetic_eps_feedback {
            let feedback = self
                .tracker
                .stock_values(catalog::ACC_EPS_STATE, CanBus::ESC)
                .map(|stock| {
                    messages::synthetic_eps_feedback(
                        stock,
                        applied_torque,
                        enabled,
                        steer_req,
                        enabled && command.lat_active && !steer_req,
                    )
                });
            match feedback {
                Some(feedback) => {
                    self.encode(catalog::ACC_EPS_STATE, CanBus::MPC, &feedback, &mut out)
                }
                None => log::trace!("No stock ACC_EPS_STATE yet, skipping feedback"),
            }
        }

        log::trace!(
            "Cycle {}: enabled={} steer_req={} torque={} accel={:.2} frames={}",
            self.cycles,
            enabled,
            steer_req,
            applied_torque,
            accel,
            out.len()
        );

        CycleOutput {
            state,
            enabled,
            steer_req,
            applied_torque,
            accel,
            frames: out,
        }
    }

    /// Encode one message into the frame set; a failure drops only that frame
    fn encode(&mut self, name: &str, bus: u8, fields: &SignalValues, out: &mut OutgoingFrameSet) {
        match self.codec.encode(name, bus, fields) {
            Ok(frame) => out.push(frame),
            Err(e) => log::warn!("Failed to encode {}: {}", name, e),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn latch(&self) -> &CruiseLatch {
        &self.latch
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn codec(&self) -> &MessageCodec {
        &self.codec
    }

    /// Number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
