use serde::Serialize;
use tracing::{debug, info, warn};
use torcs_link_core::*;

use crate::action::AgentAction;
use crate::config::{ActionLayout, EnvConfig};
use crate::error::EnvError;
use crate::observation::Observation;
use crate::reward::{judge, TerminationCause};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EpisodePhase {
    AwaitingReset,
    Running,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInfo {
    pub tick: u64,
    pub collision: bool,
    pub cause: Option<TerminationCause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// `None` only when the session died.
    pub observation: Option<Observation>,
    pub reward: f64,
    pub terminal: bool,
    pub info: StepInfo,
}

/// Per-episode state, created at reset.
struct EpisodeState {
    previous: RawTelemetry,
    last_command: ControlCommand,
    time_step: u64,
}

/// Gym-style environment over a TORCS telemetry client.
pub struct TorcsEnv<C: TelemetryClient> {
    client: C,
    config: EnvConfig,
    layout: ActionLayout,
    phase: EpisodePhase,
    episode: Option<EpisodeState>,
    initial_run: bool,
}

impl<C: TelemetryClient> TorcsEnv<C> {
    pub fn new(client: C, config: EnvConfig) -> Self {
        let layout = config.layout();
        if config.act_dim != layout.len() {
            debug!(act_dim = config.act_dim, expected = layout.len(), "act_dim differs from action layout");
        }
        Self { client, config, layout, phase: EpisodePhase::AwaitingReset, episode: None, initial_run: true }
    }

    pub fn client(&self) -> &C { &self.client }
    pub fn config(&self) -> &EnvConfig { &self.config }
    pub fn layout(&self) -> ActionLayout { self.layout }
    pub fn phase(&self) -> EpisodePhase { self.phase }

    /// True until the first episode has terminated.
    pub fn initial_run(&self) -> bool { self.initial_run }

    pub fn time_step(&self) -> u64 {
        self.episode.as_ref().map(|e| e.time_step).unwrap_or(0)
    }

    /// Ends any episode still running on `previous`, opens a fresh session on
    /// the configured port and returns the first observation.
    ///
    /// Relaunching the simulator is left to whoever supervises its process;
    /// the flag is only logged.
    pub async fn reset(
        &mut self,
        previous: Option<C::Session>,
        relaunch: bool,
    ) -> Result<(Observation, C::Session), EnvError> {
        let port = self.config.port;
        if let Some(mut prev) = previous {
            if self.phase == EpisodePhase::Running {
                let end = self.end_command();
                if let Err(e) = prev.send_command(&end).await {
                    warn!(port, error = %e, "could not signal race end");
                }
            }
            if let Err(e) = prev.close().await {
                warn!(port, error = %e, "could not close previous session");
            }
        }
        if relaunch {
            warn!(port, "relaunch requested; simulator restarts belong to the process supervisor");
        }
        self.episode = None;
        self.phase = EpisodePhase::AwaitingReset;

        let mut session = self.client.open_session(port, self.config.vision).await?;
        let raw = match session.pull_telemetry(0).await? {
            Reading::Live(t) => t,
            Reading::Dead => return Err(EnvError::DeadOnReset(port)),
        };
        let obs = Observation::from_telemetry(&raw, &self.config)?;
        self.episode = Some(EpisodeState {
            previous: raw,
            last_command: ControlCommand::default(),
            time_step: 0,
        });
        self.phase = EpisodePhase::Running;
        debug!(port, "episode started");
        Ok((obs, session))
    }

    /// Sends one action, waits for the next tick and judges it.
    pub async fn step(
        &mut self,
        tick: u64,
        session: &mut C::Session,
        action: &[f64],
        early_stop: bool,
    ) -> Result<StepOutcome, EnvError> {
        if self.phase != EpisodePhase::Running {
            return Err(EnvError::NotRunning(self.phase));
        }
        let agent = AgentAction::parse(self.layout, action)?;
        let port = self.config.port;
        let ep = self.episode.as_mut().ok_or(EnvError::NotRunning(self.phase))?;

        let cmd = agent.to_command(&ep.last_command, &ep.previous, self.config.default_speed);
        session.send_command(&cmd).await?;
        ep.last_command = cmd;
        ep.time_step += 1;

        let raw = match session.pull_telemetry(tick).await? {
            Reading::Live(t) => t,
            Reading::Dead => {
                warn!(port, tick, cause = "hardReset", "terminating because server stopped responding");
                self.phase = EpisodePhase::Terminated;
                return Ok(StepOutcome {
                    observation: None,
                    reward: 0.0,
                    terminal: true,
                    info: StepInfo { tick, collision: false, cause: Some(TerminationCause::HardReset) },
                });
            }
        };

        let obs = Observation::from_telemetry(&raw, &self.config)?;
        let j = judge(&ep.previous, &raw, &obs, early_stop);
        if j.collision {
            info!(port, tick, damage = raw.damage, "collision");
        }
        if j.terminal {
            let cause = j.cause.map(TerminationCause::as_str).unwrap_or("unknown");
            info!(port, tick, cause, reward = j.reward, "terminating episode");
            session.send_command(&ep.last_command.end_race()).await?;
            self.phase = EpisodePhase::Terminated;
            self.initial_run = false;
        }
        ep.previous = raw;

        Ok(StepOutcome {
            observation: Some(obs),
            reward: j.reward,
            terminal: j.terminal,
            info: StepInfo { tick, collision: j.collision, cause: j.cause },
        })
    }

    /// Signals the end of a running episode and closes the session.
    pub async fn end(&mut self, mut session: C::Session) -> Result<(), EnvError> {
        if self.phase == EpisodePhase::Running {
            session.send_command(&self.end_command()).await?;
        }
        session.close().await?;
        self.episode = None;
        self.phase = EpisodePhase::AwaitingReset;
        Ok(())
    }

    fn end_command(&self) -> ControlCommand {
        self.episode.as_ref()
            .map(|e| e.last_command.end_race())
            .unwrap_or_else(|| ControlCommand::default().end_race())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use torcs_link_core::testing::{telemetry, ScriptedClient};
    use crate::reward::{COLLISION_PENALTY, OFF_TRACK_PENALTY};

    fn live(speed: f64, angle: f64, pos: f64, damage: f64, fuel: f64) -> Reading {
        Reading::Live(telemetry(speed, angle, pos, damage, fuel))
    }

    fn env_with(script: Vec<Reading>, config: EnvConfig) -> TorcsEnv<ScriptedClient> {
        TorcsEnv::new(ScriptedClient::repeating(script), config)
    }

    #[tokio::test]
    async fn reset_opens_session_and_runs() {
        let mut env = env_with(vec![live(0.0, 0.0, 0.0, 0.0, 94.0)], EnvConfig::default());
        assert_eq!(env.phase(), EpisodePhase::AwaitingReset);
        let (obs, session) = env.reset(None, false).await.unwrap();
        assert_eq!(obs.fuel, 94.0);
        assert_eq!(session.port(), 3001);
        assert_eq!(env.phase(), EpisodePhase::Running);
        assert_eq!(env.time_step(), 0);
    }

    #[tokio::test]
    async fn step_before_reset_is_rejected() {
        let client = ScriptedClient::repeating(vec![]);
        let mut session = client.open_session(3001, false).await.unwrap();
        let mut env = TorcsEnv::new(client, EnvConfig::default());
        let err = env.step(0, &mut session, &[0.0], true).await.unwrap_err();
        assert!(matches!(err, EnvError::NotRunning(EpisodePhase::AwaitingReset)));
    }

    #[tokio::test]
    async fn off_track_step_terminates_and_signals_server() {
        let script = vec![live(50.0, 0.0, 0.0, 0.0, 90.0), live(60.0, 0.0, 1.5, 0.0, 89.9)];
        let mut env = env_with(script, EnvConfig::default());
        let (_, mut session) = env.reset(None, false).await.unwrap();
        let out = env.step(1, &mut session, &[0.0], true).await.unwrap();
        assert_eq!(out.reward, OFF_TRACK_PENALTY);
        assert!(out.terminal);
        assert_eq!(out.info.cause, Some(TerminationCause::OffTrack));
        assert_eq!(env.phase(), EpisodePhase::Terminated);
        assert!(!env.initial_run());
        assert_eq!(env.time_step(), 1);

        let err = env.step(2, &mut session, &[0.0], true).await.unwrap_err();
        assert!(matches!(err, EnvError::NotRunning(EpisodePhase::Terminated)));

        let sent = env.client.wire().lock().commands();
        assert_eq!(sent.len(), 2);
        assert!(!sent[0].meta);
        assert!(sent[1].meta);
    }

    #[tokio::test]
    async fn collision_and_backward_motion_together() {
        let script = vec![live(50.0, 0.0, 0.0, 0.0, 90.0), live(50.0, PI, 0.0, 5.0, 90.0)];
        let mut env = env_with(script, EnvConfig::default());
        let (_, mut session) = env.reset(None, false).await.unwrap();
        let out = env.step(1, &mut session, &[0.0], true).await.unwrap();
        assert_eq!(out.reward, COLLISION_PENALTY);
        assert!(out.terminal);
        assert!(out.info.collision);
    }

    #[tokio::test]
    async fn dead_session_is_a_hard_reset() {
        let mut env = env_with(vec![live(50.0, 0.0, 0.0, 0.0, 90.0), Reading::Dead], EnvConfig::default());
        let (_, mut session) = env.reset(None, false).await.unwrap();
        let out = env.step(1, &mut session, &[0.0], true).await.unwrap();
        assert_eq!(out.observation, None);
        assert_eq!(out.reward, 0.0);
        assert!(out.terminal);
        assert_eq!(out.info.cause, Some(TerminationCause::HardReset));
        assert_eq!(env.phase(), EpisodePhase::Terminated);
        // no end-of-race signal goes to a dead server
        assert_eq!(env.client.wire().lock().commands().iter().filter(|c| c.meta).count(), 0);
    }

    #[tokio::test]
    async fn auto_throttle_carries_accel_between_ticks() {
        let script = vec![
            live(20.0, 0.0, 0.0, 0.0, 90.0),
            live(20.0, 0.0, 0.0, 0.0, 90.0),
            live(80.0, 0.0, 0.0, 0.0, 90.0),
            live(80.0, 0.0, 0.0, 0.0, 90.0),
        ];
        let mut env = env_with(script, EnvConfig::default());
        let (_, mut session) = env.reset(None, false).await.unwrap();
        for tick in 1..=3 {
            env.step(tick, &mut session, &[0.0], true).await.unwrap();
        }
        let accels: Vec<f64> = env.client.wire().lock().commands().iter().map(|c| c.accel).collect();
        // default 0.2 is already at the cap, then two ticks above target speed
        assert_eq!(accels[0], 0.2);
        assert_eq!(accels[1], 0.2);
        assert!((accels[2] - 0.19).abs() < 1e-12);
    }

    #[tokio::test]
    async fn full_action_reaches_the_wire_untouched() {
        let config = EnvConfig { throttle: true, gear_change: true, ..EnvConfig::default() };
        let script = vec![live(20.0, 0.0, 0.0, 0.0, 90.0), live(20.0, 0.0, 0.0, 0.0, 90.0)];
        let mut env = env_with(script, config);
        let (_, mut session) = env.reset(None, false).await.unwrap();
        env.step(1, &mut session, &[-0.4, 0.9, 0.05, 4.7], true).await.unwrap();
        let sent = env.client.wire().lock().commands();
        assert_eq!((sent[0].steer, sent[0].accel, sent[0].brake, sent[0].gear), (-0.4, 0.9, 0.05, 4));
    }

    #[tokio::test]
    async fn reset_ends_running_episode_on_previous_session() {
        let mut env = env_with(vec![live(20.0, 0.0, 0.0, 0.0, 90.0)], EnvConfig::default());
        let (_, first) = env.reset(None, false).await.unwrap();
        let (_, second) = env.reset(Some(first), true).await.unwrap();
        {
            let wire = env.client.wire();
            let w = wire.lock();
            assert_eq!(w.opened, vec![3001, 3001]);
            assert_eq!(w.closed, vec![3001]);
            assert!(w.sent.last().unwrap().1.meta);
        }
        env.end(second).await.unwrap();
        assert_eq!(env.phase(), EpisodePhase::AwaitingReset);
        assert_eq!(env.client.wire().lock().closed.len(), 2);
    }

    #[tokio::test]
    async fn reset_on_dead_server_fails() {
        let mut env = env_with(vec![Reading::Dead], EnvConfig::default());
        assert!(matches!(env.reset(None, false).await, Err(EnvError::DeadOnReset(3001))));
    }
}
