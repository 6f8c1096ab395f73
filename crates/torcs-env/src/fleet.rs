//! Parallel data collection: one worker per simulator port, started in a staggered sequence.

use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use torcs_link_core::TelemetryClient;

use crate::config::EnvConfig;
use crate::env::TorcsEnv;
use crate::policy::Policy;
use crate::worker::{run_worker, RecordTx, WorkerConfig, WorkerReport};

/// Pause between worker starts so sessions don't collide while the server negotiates.
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub workers: usize,
    pub base_port: u16,
    pub stagger: Duration,
    pub episodes: u32,
    pub max_steps: u64,
    pub keep_transitions: bool,
    /// Template for every worker; its port is replaced per worker.
    pub env: EnvConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            base_port: 3001,
            stagger: DEFAULT_STAGGER,
            episodes: 1,
            max_steps: 10_000,
            keep_transitions: true,
            env: EnvConfig::default(),
        }
    }
}

impl FleetConfig {
    /// Port for worker `i`, if it fits in the port range.
    pub fn port(&self, i: usize) -> Option<u16> {
        u16::try_from(i).ok().and_then(|i| self.base_port.checked_add(i))
    }
}

#[derive(Debug)]
pub struct WorkerOutcome {
    pub worker: usize,
    pub port: u16,
    pub result: Result<WorkerReport, String>,
}

/// Starts every worker, waits for all of them and returns their outcomes in worker order.
/// A failing worker is reported, it does not stop the others.
pub async fn run_fleet<C, P, FC, FP>(
    cfg: FleetConfig,
    make_client: FC,
    make_policy: FP,
    sink: RecordTx,
) -> Vec<WorkerOutcome>
where
    C: TelemetryClient + 'static,
    P: Policy + 'static,
    FC: Fn(usize) -> C,
    FP: Fn(usize, &EnvConfig) -> P,
{
    let mut set = JoinSet::new();
    let mut outcomes = Vec::with_capacity(cfg.workers);

    for i in 0..cfg.workers {
        let Some(port) = cfg.port(i) else {
            error!(worker = i, base_port = cfg.base_port, "worker port out of range");
            outcomes.push(WorkerOutcome { worker: i, port: 0, result: Err("port out of range".into()) });
            continue;
        };
        if i > 0 {
            tokio::time::sleep(cfg.stagger).await;
        }

        let env_cfg = EnvConfig { port, ..cfg.env.clone() };
        let mut policy = make_policy(i, &env_cfg);
        let early_stop = env_cfg.early_stop;
        let mut env = TorcsEnv::new(make_client(i), env_cfg);
        let wcfg = WorkerConfig {
            worker: i,
            episodes: cfg.episodes,
            max_steps: cfg.max_steps,
            early_stop,
            keep_transitions: cfg.keep_transitions,
        };
        let tx = sink.clone();

        info!(worker = i, port, "starting worker");
        set.spawn(async move {
            let result = run_worker(&mut env, &mut policy, &wcfg, &tx).await;
            (i, port, result)
        });
    }
    drop(sink);

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((worker, port, Ok(report))) => {
                info!(worker, port, episodes = report.episodes, steps = report.steps, "worker done");
                outcomes.push(WorkerOutcome { worker, port, result: Ok(report) });
            }
            Ok((worker, port, Err(e))) => {
                warn!(worker, port, error = %e, "worker failed");
                outcomes.push(WorkerOutcome { worker, port, result: Err(e.to_string()) });
            }
            Err(e) => error!(error = %e, "worker task aborted"),
        }
    }
    outcomes.sort_by_key(|o| o.worker);
    outcomes
}
