//! Reward shaping and termination rules.

use serde::{Deserialize, Serialize};
use torcs_link_core::RawTelemetry;

use crate::observation::Observation;

pub const COLLISION_PENALTY: f64 = -1000.0;
pub const OFF_TRACK_PENALTY: f64 = -200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationCause {
    OffTrack,
    TurnedBack,
    /// The server stopped answering; the episode cannot continue.
    HardReset,
    /// The worker's step budget ran out.
    StepLimit,
}

impl TerminationCause {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationCause::OffTrack => "offTrack",
            TerminationCause::TurnedBack => "turnedBack",
            TerminationCause::HardReset => "hardReset",
            TerminationCause::StepLimit => "stepLimit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Judgement {
    pub reward: f64,
    pub terminal: bool,
    pub collision: bool,
    pub cause: Option<TerminationCause>,
}

/// Progress along the track axis, minus lateral and off-center terms,
/// plus a bonus for burning little fuel.
pub fn shaped_reward(prev: &RawTelemetry, cur: &RawTelemetry) -> f64 {
    let sp = cur.speed_x;
    let fuel_consumed = prev.fuel - cur.fuel;
    sp * cur.angle.cos()
        - (sp * cur.angle.sin()).abs()
        - sp * cur.track_pos.abs()
        + 1.0 / (fuel_consumed * fuel_consumed + 0.01)
}

/// Applies the collision, off-track and turned-back rules on top of the shaped reward.
///
/// A collision pins the reward at the collision penalty unless the car also left
/// the track, which overrides it. Turning back ends the episode without touching the reward.
pub fn judge(prev: &RawTelemetry, cur: &RawTelemetry, obs: &Observation, early_stop: bool) -> Judgement {
    let mut reward = shaped_reward(prev, cur);
    let collision = cur.damage - prev.damage > 0.0;
    if collision {
        reward = COLLISION_PENALTY;
    }

    let mut terminal = false;
    let mut cause = None;
    let off_track = obs.track.iter().any(|s| s.abs() > 1.0) || cur.track_pos.abs() > 1.0;
    if early_stop && off_track {
        reward = OFF_TRACK_PENALTY;
        terminal = true;
        cause = Some(TerminationCause::OffTrack);
    }
    if cur.angle.cos() < 0.0 {
        terminal = true;
        cause.get_or_insert(TerminationCause::TurnedBack);
    }

    Judgement { reward, terminal, collision, cause }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use crate::config::EnvConfig;
    use torcs_link_core::testing::telemetry;
    use torcs_link_core::TRACK_SENSORS;

    fn run(prev: &RawTelemetry, cur: &RawTelemetry, early_stop: bool) -> Judgement {
        let obs = Observation::from_telemetry(cur, &EnvConfig::default()).unwrap();
        judge(prev, cur, &obs, early_stop)
    }

    #[test]
    fn straight_run_rewards_speed_and_thrift() {
        let prev = telemetry(100.0, 0.0, 0.0, 0.0, 50.0);
        let cur = telemetry(100.0, 0.0, 0.0, 0.0, 50.0);
        let j = run(&prev, &cur, true);
        assert!((j.reward - (100.0 + 100.0)).abs() < 1e-9);
        assert!(!j.terminal);
        assert!(!j.collision);
        assert_eq!(j.cause, None);
    }

    #[test]
    fn misalignment_and_offset_are_penalized() {
        let prev = telemetry(100.0, 0.0, 0.0, 0.0, 50.0);
        let cur = telemetry(100.0, 0.2, 0.5, 0.0, 49.9);
        let expected = 100.0 * 0.2f64.cos() - (100.0 * 0.2f64.sin()).abs() - 50.0 + 1.0 / (0.1f64.powi(2) + 0.01);
        assert!((run(&prev, &cur, true).reward - expected).abs() < 1e-6);
    }

    #[test]
    fn off_track_ends_episode_with_penalty() {
        let prev = telemetry(80.0, 0.0, 0.9, 0.0, 50.0);
        let cur = telemetry(80.0, 0.1, 1.5, 0.0, 49.0);
        let j = run(&prev, &cur, true);
        assert_eq!(j.reward, OFF_TRACK_PENALTY);
        assert!(j.terminal);
        assert_eq!(j.cause, Some(TerminationCause::OffTrack));
    }

    #[test]
    fn off_track_ignored_without_early_stop() {
        let prev = telemetry(80.0, 0.0, 0.9, 0.0, 50.0);
        let cur = telemetry(80.0, 0.1, -1.5, 0.0, 49.0);
        let j = run(&prev, &cur, false);
        assert!(!j.terminal);
        assert_ne!(j.reward, OFF_TRACK_PENALTY);
    }

    #[test]
    fn collision_penalty_does_not_terminate() {
        let prev = telemetry(60.0, 0.0, 0.0, 0.0, 50.0);
        let cur = telemetry(60.0, 0.0, 0.0, 5.0, 50.0);
        let j = run(&prev, &cur, true);
        assert_eq!(j.reward, COLLISION_PENALTY);
        assert!(j.collision);
        assert!(!j.terminal);
    }

    #[test]
    fn collision_while_turning_back() {
        let prev = telemetry(60.0, 0.0, 0.0, 0.0, 50.0);
        let cur = telemetry(60.0, 0.75 * PI, 0.0, 5.0, 50.0);
        let j = run(&prev, &cur, true);
        assert_eq!(j.reward, COLLISION_PENALTY);
        assert!(j.terminal);
        assert_eq!(j.cause, Some(TerminationCause::TurnedBack));
    }

    #[test]
    fn off_track_overrides_collision_penalty() {
        let prev = telemetry(60.0, 0.0, 0.0, 0.0, 50.0);
        let cur = telemetry(60.0, 0.0, 1.5, 5.0, 50.0);
        let j = run(&prev, &cur, true);
        assert_eq!(j.reward, OFF_TRACK_PENALTY);
        assert!(j.collision);
        assert!(j.terminal);
        assert_eq!(j.cause, Some(TerminationCause::OffTrack));
    }

    #[test]
    fn track_sensor_past_range_is_off_track() {
        let prev = telemetry(60.0, 0.0, 0.2, 0.0, 50.0);
        let mut cur = telemetry(60.0, 0.0, 0.2, 0.0, 50.0);
        cur.track = vec![50.0; TRACK_SENSORS];
        cur.track[7] = 200.5;
        let j = run(&prev, &cur, true);
        assert_eq!(j.reward, OFF_TRACK_PENALTY);
        assert!(j.terminal);
        assert_eq!(j.cause, Some(TerminationCause::OffTrack));
    }

    #[test]
    fn track_sensor_at_range_stays_on_track() {
        let prev = telemetry(60.0, 0.0, 0.2, 0.0, 50.0);
        let mut cur = telemetry(60.0, 0.0, 0.2, 0.0, 50.0);
        cur.track = vec![50.0; TRACK_SENSORS];
        cur.track[7] = 200.0;
        cur.track[11] = -200.0;
        let j = run(&prev, &cur, true);
        assert!(!j.terminal);
        assert_eq!(j.cause, None);
        assert_ne!(j.reward, OFF_TRACK_PENALTY);
    }

    #[test]
    fn turning_back_keeps_shaped_reward() {
        let prev = telemetry(30.0, 0.0, 0.0, 0.0, 50.0);
        let cur = telemetry(30.0, PI, 0.0, 0.0, 50.0);
        let j = run(&prev, &cur, true);
        assert!(j.terminal);
        assert!((j.reward - shaped_reward(&prev, &cur)).abs() < 1e-12);
    }

    #[test]
    fn causes_serialize_camel_case() {
        assert_eq!(serde_json::to_string(&TerminationCause::HardReset).unwrap(), "\"hardReset\"");
        assert_eq!(TerminationCause::OffTrack.as_str(), "offTrack");
    }
}
