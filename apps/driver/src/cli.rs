use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "torcs-driver", version)]
#[command(about = "Drives TORCS cars over the SCR protocol and records episodes", long_about = None)]
pub struct Cli {
    /// Path to a YAML run configuration
    #[arg(long, short, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Number of parallel workers, one simulator port each
    #[arg(long)]
    pub workers: Option<usize>,

    /// Port of the first worker; worker i uses base_port + i
    #[arg(long = "base-port")]
    pub base_port: Option<u16>,

    /// Episodes per worker
    #[arg(long)]
    pub episodes: Option<u32>,

    /// Step cap per episode
    #[arg(long = "max-steps")]
    pub max_steps: Option<u64>,

    /// Request the 64x64 image channel instead of damage
    #[arg(long, default_value_t = false)]
    pub vision: bool,

    /// Let the agent drive the pedals
    #[arg(long, default_value_t = false)]
    pub throttle: bool,

    /// Let the agent pick the gear
    #[arg(long = "gear-change", default_value_t = false)]
    pub gear_change: bool,

    /// Keep episodes running after leaving the track
    #[arg(long = "no-early-stop", default_value_t = false)]
    pub no_early_stop: bool,

    /// SCR server host
    #[arg(long)]
    pub host: Option<String>,

    /// Output directory for episode logs
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the worker fleet (default)
    Run,
    /// Print statistics for a recorded episodes.ndjson
    Summarize {
        #[arg(value_name = "EPISODES")]
        path: PathBuf,
        /// Moving-average window for the reward curve
        #[arg(long, default_value_t = 10)]
        window: usize,
    },
}
