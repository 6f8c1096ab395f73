//! Episode loop for a single worker bound to one simulator port.

use model::{EpisodeRecord, TransitionRecord};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};
use torcs_link_core::TelemetryClient;

use crate::env::{StepOutcome, TorcsEnv};
use crate::error::EnvError;
use crate::policy::Policy;
use crate::reward::TerminationCause;

pub type RecordTx = crossbeam_channel::Sender<EpisodeRecord>;
pub type RecordRx = crossbeam_channel::Receiver<EpisodeRecord>;

pub fn record_channel() -> (RecordTx, RecordRx) {
    crossbeam_channel::unbounded()
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker: usize,
    pub episodes: u32,
    pub max_steps: u64,
    pub early_stop: bool,
    pub keep_transitions: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerReport {
    pub episodes: u32,
    pub steps: u64,
    pub total_reward: f64,
    pub hard_resets: u32,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

fn transition(out: &StepOutcome) -> TransitionRecord {
    let obs = out.observation.as_ref();
    TransitionRecord {
        tick: out.info.tick,
        reward: out.reward,
        terminal: out.terminal,
        collision: out.info.collision,
        cause: out.info.cause.map(|c| c.as_str().to_string()),
        speed_x: obs.map(|o| o.speed_x),
        angle: obs.map(|o| o.angle),
        track_pos: obs.map(|o| o.track_pos),
        fuel: obs.map(|o| o.fuel),
    }
}

/// Runs `cfg.episodes` episodes back to back, sending one record per episode to `sink`.
pub async fn run_worker<C, P>(
    env: &mut TorcsEnv<C>,
    policy: &mut P,
    cfg: &WorkerConfig,
    sink: &RecordTx,
) -> Result<WorkerReport, EnvError>
where
    C: TelemetryClient,
    P: Policy + ?Sized,
{
    let port = env.config().port;
    let mut report = WorkerReport::default();
    let mut session = None;

    for episode in 0..cfg.episodes {
        let (mut obs, mut live) = env.reset(session.take(), false).await?;
        let mut rec = EpisodeRecord::new(cfg.worker, port, episode, now_rfc3339());

        for tick in 1..=cfg.max_steps {
            let action = policy.select_action(&obs);
            let stepped = env.step(tick, &mut live, &action, cfg.early_stop).await;
            let out = match stepped {
                Ok(out) => out,
                Err(e) => {
                    if let Err(close_err) = env.end(live).await {
                        warn!(worker = cfg.worker, port, error = %close_err, "could not close session");
                    }
                    return Err(e);
                }
            };
            rec.steps += 1;
            rec.total_reward += out.reward;
            if out.info.collision {
                rec.collisions += 1;
            }
            if cfg.keep_transitions {
                rec.transitions.push(transition(&out));
            }
            if out.terminal {
                rec.termination = out.info.cause.map(|c| c.as_str().to_string());
                if out.info.cause == Some(TerminationCause::HardReset) {
                    report.hard_resets += 1;
                }
                break;
            }
            match out.observation {
                Some(next) => obs = next,
                None => break,
            }
        }
        if rec.termination.is_none() {
            rec.termination = Some(TerminationCause::StepLimit.as_str().to_string());
        }

        info!(
            worker = cfg.worker, port, episode,
            steps = rec.steps, reward = rec.total_reward,
            cause = rec.termination.as_deref().unwrap_or(""),
            "episode finished"
        );
        report.episodes += 1;
        report.steps += rec.steps;
        report.total_reward += rec.total_reward;
        if sink.send(rec).is_err() {
            warn!(worker = cfg.worker, port, episode, "record sink closed, episode dropped");
        }
        session = Some(live);
    }

    if let Some(live) = session {
        env.end(live).await?;
    }
    Ok(report)
}
