//! Agent action vectors to driver commands, with the automatic throttle and gearbox.

use torcs_link_core::{ControlCommand, RawTelemetry};

use crate::config::ActionLayout;
use crate::error::EnvError;

const ACCEL_STEP: f64 = 0.01;
const ACCEL_CAP: f64 = 0.2;
const LOW_SPEED: f64 = 10.0;
const TRACTION_SLIP: f64 = 5.0;
const TRACTION_CUT: f64 = 0.2;

/// Upshift points in km/h, gear 2 through 6.
const UPSHIFT_AT: [f64; 5] = [50.0, 80.0, 110.0, 140.0, 170.0];

/// An action vector read according to its layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgentAction {
    Steer { steer: f64 },
    SteerGear { steer: f64, gear: i32 },
    Pedals { steer: f64, accel: f64, brake: f64 },
    PedalsGear { steer: f64, accel: f64, brake: f64, gear: i32 },
}

impl AgentAction {
    pub fn parse(layout: ActionLayout, u: &[f64]) -> Result<Self, EnvError> {
        if u.len() != layout.len() {
            return Err(EnvError::ActionLength { layout, expected: layout.len(), got: u.len() });
        }
        Ok(match layout {
            ActionLayout::Steer => AgentAction::Steer { steer: u[0] },
            ActionLayout::SteerGear => AgentAction::SteerGear { steer: u[0], gear: u[3] as i32 },
            ActionLayout::Pedals => AgentAction::Pedals { steer: u[0], accel: u[1], brake: u[2] },
            ActionLayout::PedalsGear => AgentAction::PedalsGear {
                steer: u[0], accel: u[1], brake: u[2], gear: u[3] as i32,
            },
        })
    }

    pub fn steer(&self) -> f64 {
        match *self {
            AgentAction::Steer { steer }
            | AgentAction::SteerGear { steer, .. }
            | AgentAction::Pedals { steer, .. }
            | AgentAction::PedalsGear { steer, .. } => steer,
        }
    }

    /// Builds this tick's command. `prev` is the command sent last tick and
    /// `seen` the telemetry it was chosen against.
    pub fn to_command(&self, prev: &ControlCommand, seen: &RawTelemetry, target_speed: f64) -> ControlCommand {
        let steer = self.steer();
        let mut cmd = ControlCommand { steer, meta: false, ..prev.clone() };
        match *self {
            AgentAction::Pedals { accel, brake, .. } | AgentAction::PedalsGear { accel, brake, .. } => {
                cmd.accel = accel;
                cmd.brake = brake;
            }
            _ => cmd.accel = auto_throttle(prev.accel, steer, seen, target_speed),
        }
        cmd.gear = match *self {
            AgentAction::SteerGear { gear, .. } | AgentAction::PedalsGear { gear, .. } => gear,
            AgentAction::Pedals { .. } => auto_gear(seen.speed_x),
            AgentAction::Steer { .. } => 1,
        };
        cmd
    }
}

/// Holds speed near `target`, slower in turns, with launch boost and traction control.
pub fn auto_throttle(prev_accel: f64, steer: f64, seen: &RawTelemetry, target: f64) -> f64 {
    let mut accel = if seen.speed_x < target - steer * 50.0 {
        prev_accel + ACCEL_STEP
    } else {
        prev_accel - ACCEL_STEP
    };
    if accel > ACCEL_CAP {
        accel = ACCEL_CAP;
    }
    if seen.speed_x < LOW_SPEED {
        accel += 1.0 / (seen.speed_x + 0.1);
    }
    if seen.rear_front_spin_delta() > TRACTION_SLIP {
        accel -= TRACTION_CUT;
    }
    accel
}

pub fn auto_gear(speed_x: f64) -> i32 {
    1 + UPSHIFT_AT.iter().filter(|&&s| speed_x > s).count() as i32
}
