//! Telemetry model and collaborator traits shared by the TORCS link and the gym bridge

use serde::{Serialize, Deserialize};

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub const TRACK_SENSORS: usize = 19;
pub const FOCUS_SENSORS: usize = 5;
pub const OPPONENT_SENSORS: usize = 36;
pub const WHEELS: usize = 4;

/// Range reported by an opponent sensor that sees nothing.
pub const OPPONENT_RANGE: f64 = 200.0;

/// One tick of simulator sensor state, as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTelemetry {
    pub angle: f64,          // radians between car heading and track axis
    pub cur_lap_time: f64,
    pub damage: f64,
    pub dist_from_start: f64,
    pub dist_raced: f64,
    pub fuel: f64,           // litres
    pub gear: i32,
    pub last_lap_time: f64,
    pub race_pos: u32,
    pub rpm: f64,
    pub speed_x: f64,        // km/h, longitudinal
    pub speed_y: f64,        // km/h, lateral
    pub speed_z: f64,
    pub track_pos: f64,      // 0 on the axis, +-1 on the edges
    pub z: f64,

    pub focus: Vec<f64>,
    pub track: Vec<f64>,
    pub opponents: Vec<f64>,
    pub wheel_spin_vel: Vec<f64>, // front-left, front-right, rear-left, rear-right

    /// Interleaved RGB bytes, only present when the server runs with vision.
    #[serde(default)]
    pub img: Option<Vec<u8>>,
}

impl Default for RawTelemetry {
    fn default() -> Self {
        Self {
            angle: 0.0, cur_lap_time: 0.0, damage: 0.0,
            dist_from_start: 0.0, dist_raced: 0.0, fuel: 0.0, gear: 0,
            last_lap_time: 0.0, race_pos: 1, rpm: 0.0,
            speed_x: 0.0, speed_y: 0.0, speed_z: 0.0,
            track_pos: 0.0, z: 0.0,
            focus: vec![-1.0; FOCUS_SENSORS],
            track: vec![0.0; TRACK_SENSORS],
            opponents: vec![OPPONENT_RANGE; OPPONENT_SENSORS],
            wheel_spin_vel: vec![0.0; WHEELS],
            img: None,
        }
    }
}

impl RawTelemetry {
    /// Rear wheel spin minus front wheel spin.
    pub fn rear_front_spin_delta(&self) -> f64 {
        let w = |i: usize| self.wheel_spin_vel.get(i).copied().unwrap_or(0.0);
        (w(2) + w(3)) - (w(0) + w(1))
    }
}

/// Driver command sent back to the server for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub steer: f64,   // -1..1
    pub accel: f64,   // 0..1
    pub brake: f64,   // 0..1
    pub clutch: f64,  // 0..1
    pub gear: i32,    // -1..6
    pub focus: [i32; FOCUS_SENSORS],
    /// Asks the server to end the current race.
    pub meta: bool,
}

impl Default for ControlCommand {
    fn default() -> Self {
        Self {
            steer: 0.0,
            accel: 0.2,
            brake: 0.0,
            clutch: 0.0,
            gear: 1,
            focus: [-90, -45, 0, 45, 90],
            meta: false,
        }
    }
}

impl ControlCommand {
    /// Same command with the end-of-race flag raised.
    pub fn end_race(&self) -> Self {
        Self { meta: true, ..self.clone() }
    }
}

/// Result of pulling one tick from a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Live(RawTelemetry),
    /// The server stopped responding or ended the race.
    Dead,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("{0}")]
    Msg(String),
    #[error("no answer from simulator on port {port} after {attempts} attempts")]
    Unreachable { port: u16, attempts: u32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Opens telemetry sessions against a running simulator.
#[async_trait::async_trait]
pub trait TelemetryClient: Send + Sync {
    type Session: TelemetrySession + 'static;

    async fn open_session(&self, port: u16, vision: bool) -> Result<Self::Session, LinkError>;
}

/// A live connection bound to one simulator port.
#[async_trait::async_trait]
pub trait TelemetrySession: Send {
    fn port(&self) -> u16;

    /// Blocks until the next server tick arrives or the session dies.
    async fn pull_telemetry(&mut self, tick: u64) -> Result<Reading, LinkError>;

    async fn send_command(&mut self, cmd: &ControlCommand) -> Result<(), LinkError>;

    async fn close(&mut self) -> Result<(), LinkError>;
}
