//! Gym-style bridge between a TORCS telemetry session and a learning agent.
//!
//! [`TorcsEnv`] owns the episode lifecycle: it turns raw telemetry into
//! normalized [`Observation`]s, translates agent actions into driver commands
//! (with the automatic throttle and gearbox when the agent doesn't drive
//! them), shapes the reward and decides when an episode is over.
//! [`run_fleet`] runs one episode worker per simulator port.

pub mod action;
pub mod config;
pub mod env;
pub mod error;
pub mod fleet;
pub mod observation;
pub mod policy;
pub mod reward;
pub mod worker;

pub use action::AgentAction;
pub use config::{ActionLayout, EnvConfig};
pub use env::{EpisodePhase, StepInfo, StepOutcome, TorcsEnv};
pub use error::EnvError;
pub use fleet::{run_fleet, FleetConfig, WorkerOutcome};
pub use observation::{ModeChannel, Observation, RgbImage};
pub use policy::{LaneKeeper, Policy};
pub use reward::{Judgement, TerminationCause};
pub use worker::{record_channel, run_worker, RecordRx, RecordTx, WorkerConfig, WorkerReport};
