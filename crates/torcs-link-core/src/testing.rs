//! In-memory client that replays scripted readings and records what was sent.

use std::collections::VecDeque;
use std::sync::Arc;
use parking_lot::Mutex;

use crate::*;

#[derive(Debug, Default)]
pub struct Wire {
    pub opened: Vec<u16>,
    pub closed: Vec<u16>,
    pub sent: Vec<(u16, ControlCommand)>,
}

impl Wire {
    pub fn commands(&self) -> Vec<ControlCommand> {
        self.sent.iter().map(|(_, c)| c.clone()).collect()
    }
}

pub type SharedWire = Arc<Mutex<Wire>>;

pub struct ScriptedSession {
    port: u16,
    readings: VecDeque<Reading>,
    wire: SharedWire,
}

impl ScriptedSession {
    pub fn new(port: u16, readings: impl IntoIterator<Item = Reading>, wire: SharedWire) -> Self {
        Self { port, readings: readings.into_iter().collect(), wire }
    }
}

#[async_trait::async_trait]
impl TelemetrySession for ScriptedSession {
    fn port(&self) -> u16 { self.port }

    async fn pull_telemetry(&mut self, _tick: u64) -> Result<Reading, LinkError> {
        Ok(self.readings.pop_front().unwrap_or(Reading::Dead))
    }

    async fn send_command(&mut self, cmd: &ControlCommand) -> Result<(), LinkError> {
        self.wire.lock().sent.push((self.port, cmd.clone()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.wire.lock().closed.push(self.port);
        Ok(())
    }
}

/// Hands out one scripted session per `open_session` call.
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Vec<Reading>>>,
    repeat: Option<Vec<Reading>>,
    wire: SharedWire,
}

impl ScriptedClient {
    /// Each open consumes the next script; opens past the end fail.
    pub fn new(scripts: Vec<Vec<Reading>>) -> Self {
        Self { scripts: Mutex::new(scripts.into()), repeat: None, wire: SharedWire::default() }
    }

    /// Every open replays the same script.
    pub fn repeating(script: Vec<Reading>) -> Self {
        Self { scripts: Mutex::new(VecDeque::new()), repeat: Some(script), wire: SharedWire::default() }
    }

    pub fn wire(&self) -> SharedWire { self.wire.clone() }
}

#[async_trait::async_trait]
impl TelemetryClient for ScriptedClient {
    type Session = ScriptedSession;

    async fn open_session(&self, port: u16, _vision: bool) -> Result<ScriptedSession, LinkError> {
        let script = match self.scripts.lock().pop_front() {
            Some(s) => s,
            None => self.repeat.clone().ok_or(LinkError::Unreachable { port, attempts: 1 })?,
        };
        self.wire.lock().opened.push(port);
        Ok(ScriptedSession::new(port, script, self.wire.clone()))
    }
}

/// Telemetry with the fields the bridge reads most often set.
pub fn telemetry(speed_x: f64, angle: f64, track_pos: f64, damage: f64, fuel: f64) -> RawTelemetry {
    RawTelemetry { speed_x, angle, track_pos, damage, fuel, ..RawTelemetry::default() }
}
