use anyhow::Context;
use serde::Deserialize;
use tokio::{net::UdpSocket, time::{self, Duration}};
use tracing::{debug, info, warn};
use torcs_link_core::*;

/// Track-sensor angles requested at identification, in degrees.
pub const TRACK_SENSOR_ANGLES: [i32; TRACK_SENSORS] =
    [-90, -75, -60, -45, -30, -20, -15, -10, -5, 0, 5, 10, 15, 20, 30, 45, 60, 75, 90];

const CLIENT_ID: &str = "SCR";
const DATAGRAM_SIZE: usize = 65536;

const IDENTIFIED: &str = "***identified***";
const SHUTDOWN: &str = "***shutdown***";
const RESTART: &str = "***restart***";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScrConfig {
    pub host: String,              // simulator host, ports are chosen per session
    pub max_connect_attempts: u32,
    pub recv_timeout_ms: u64,
}

impl Default for ScrConfig {
    fn default() -> Self {
        Self { host: "localhost".into(), max_connect_attempts: 5, recv_timeout_ms: 1000 }
    }
}

pub struct ScrClient {
    cfg: ScrConfig
}

impl ScrClient {
    pub fn new(cfg: ScrConfig) -> Self { Self { cfg } }
}

pub fn identification_string() -> String {
    let angles: Vec<String> = TRACK_SENSOR_ANGLES.iter().map(|a| a.to_string()).collect();
    format!("{}(init {})", CLIENT_ID, angles.join(" "))
}

#[async_trait::async_trait]
impl TelemetryClient for ScrClient {
    type Session = ScrSession;

    async fn open_session(&self, port: u16, vision: bool) -> Result<ScrSession, LinkError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await
            .context("bind local udp socket")?;
        socket.connect((self.cfg.host.as_str(), port)).await
            .with_context(|| format!("connect {}:{}", self.cfg.host, port))?;

        let timeout = Duration::from_millis(self.cfg.recv_timeout_ms);
        let init = identification_string();
        let mut buf = vec![0u8; DATAGRAM_SIZE];

        for attempt in 1..=self.cfg.max_connect_attempts {
            socket.send(init.as_bytes()).await?;
            match time::timeout(timeout, socket.recv(&mut buf)).await {
                Ok(Ok(len)) if decode(&buf[..len]).contains(IDENTIFIED) => {
                    info!(port, vision, "client identified");
                    return Ok(ScrSession {
                        socket, port, timeout, buf,
                        max_failures: self.cfg.max_connect_attempts,
                        closed: false,
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    // nobody listening yet, the kernel reports it right away
                    debug!(port, attempt, error = %e, "waiting for server");
                    time::sleep(timeout).await;
                }
                Err(_) => debug!(port, attempt, "waiting for server"),
            }
        }
        Err(LinkError::Unreachable { port, attempts: self.cfg.max_connect_attempts })
    }
}

pub struct ScrSession {
    socket: UdpSocket,
    port: u16,
    timeout: Duration,
    buf: Vec<u8>,
    max_failures: u32,
    closed: bool,
}

#[async_trait::async_trait]
impl TelemetrySession for ScrSession {
    fn port(&self) -> u16 { self.port }

    async fn pull_telemetry(&mut self, tick: u64) -> Result<Reading, LinkError> {
        if self.closed {
            return Ok(Reading::Dead);
        }
        let mut failures = 0;
        loop {
            let len = match time::timeout(self.timeout, self.socket.recv(&mut self.buf)).await {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => {
                    failures += 1;
                    if failures >= self.max_failures {
                        warn!(port = self.port, tick, error = %e, "server unreachable");
                        self.closed = true;
                        return Ok(Reading::Dead);
                    }
                    time::sleep(self.timeout).await;
                    continue;
                }
                Err(_) => {
                    debug!(port = self.port, tick, "waiting for server");
                    continue;
                }
            };
            let msg = decode(&self.buf[..len]);
            if msg.is_empty() || msg.contains(IDENTIFIED) {
                continue;
            }
            if msg.contains(SHUTDOWN) || msg.contains(RESTART) {
                info!(port = self.port, tick, msg = %msg, "server ended the race");
                self.closed = true;
                return Ok(Reading::Dead);
            }
            return Ok(Reading::Live(parse_server_str(&msg)));
        }
    }

    async fn send_command(&mut self, cmd: &ControlCommand) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Msg(format!("session on port {} is closed", self.port)));
        }
        if cmd.meta {
            debug!(port = self.port, "requesting race end");
        }
        self.socket.send(encode_command(cmd).as_bytes()).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.closed = true;
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches('\0').trim().to_string()
}

fn set(dst: &mut f64, v: Option<f64>) {
    if let Some(v) = v { *dst = v; }
}

fn set_vec(dst: &mut Vec<f64>, v: Vec<f64>) {
    if !v.is_empty() { *dst = v; }
}

/// Parses a server message like `(angle 0.01)(track 7.5 8.1 ...)(speedX 12)`.
/// Unknown channels and malformed numbers are ignored.
pub fn parse_server_str(msg: &str) -> RawTelemetry {
    let mut t = RawTelemetry::default();
    for group in msg.split('(').filter_map(|g| g.split(')').next()) {
        let mut it = group.split_whitespace();
        let Some(name) = it.next() else { continue };
        let values: Vec<f64> = it.filter_map(|v| v.parse().ok()).collect();
        let first = values.first().copied();
        match name {
            "angle" => set(&mut t.angle, first),
            "curLapTime" => set(&mut t.cur_lap_time, first),
            "damage" => set(&mut t.damage, first),
            "distFromStart" => set(&mut t.dist_from_start, first),
            "distRaced" => set(&mut t.dist_raced, first),
            "fuel" => set(&mut t.fuel, first),
            "gear" => if let Some(g) = first { t.gear = g as i32 },
            "lastLapTime" => set(&mut t.last_lap_time, first),
            "racePos" => if let Some(p) = first { t.race_pos = p.max(0.0) as u32 },
            "rpm" => set(&mut t.rpm, first),
            "speedX" => set(&mut t.speed_x, first),
            "speedY" => set(&mut t.speed_y, first),
            "speedZ" => set(&mut t.speed_z, first),
            "trackPos" => set(&mut t.track_pos, first),
            "z" => set(&mut t.z, first),
            "focus" => set_vec(&mut t.focus, values),
            "track" => set_vec(&mut t.track, values),
            "opponents" => set_vec(&mut t.opponents, values),
            "wheelSpinVel" => set_vec(&mut t.wheel_spin_vel, values),
            "img" => t.img = Some(values.iter().map(|v| v.clamp(0.0, 255.0) as u8).collect()),
            _ => {}
        }
    }
    t
}

/// Encodes a command, clipped to what the server accepts.
pub fn encode_command(c: &ControlCommand) -> String {
    let gear = if (-1..=6).contains(&c.gear) { c.gear } else { 0 };
    let focus: Vec<String> = c.focus.iter().map(|f| (*f).clamp(-90, 90).to_string()).collect();
    format!(
        "(accel {})(brake {})(clutch {})(gear {})(steer {})(focus {})(meta {})",
        c.accel.clamp(0.0, 1.0),
        c.brake.clamp(0.0, 1.0),
        c.clutch.clamp(0.0, 1.0),
        gear,
        c.steer.clamp(-1.0, 1.0),
        focus.join(" "),
        c.meta as u8,
    )
}
