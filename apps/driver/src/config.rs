use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use torcs_env::{EnvConfig, FleetConfig};
use torcs_link_scr::ScrConfig;

use crate::cli::Cli;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub workers: usize,
    pub base_port: u16,
    pub stagger_ms: u64,
    pub episodes: u32,
    pub max_steps: u64,
    pub keep_transitions: bool,
    pub out_dir: PathBuf,
    pub env: EnvConfig,
    pub scr: ScrConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            base_port: 3001,
            stagger_ms: 500,
            episodes: 1,
            max_steps: 10_000,
            keep_transitions: true,
            out_dir: PathBuf::from("runs"),
            env: EnvConfig::default(),
            scr: ScrConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Command-line flags win over the file. Boolean flags only ever switch a mode on.
    pub fn apply(&mut self, cli: &Cli) {
        if let Some(n) = cli.workers { self.workers = n; }
        if let Some(p) = cli.base_port { self.base_port = p; }
        if let Some(n) = cli.episodes { self.episodes = n; }
        if let Some(n) = cli.max_steps { self.max_steps = n; }
        if let Some(h) = &cli.host { self.scr.host = h.clone(); }
        if let Some(o) = &cli.out { self.out_dir = o.clone(); }
        self.env.vision |= cli.vision;
        self.env.throttle |= cli.throttle;
        self.env.gear_change |= cli.gear_change;
        if cli.no_early_stop {
            self.env.early_stop = false;
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.workers > 0, "workers must be at least 1");
        ensure!(self.episodes > 0, "episodes must be at least 1");
        ensure!(self.max_steps > 0, "max_steps must be at least 1");
        let last = self.base_port as usize + self.workers - 1;
        ensure!(
            last <= u16::MAX as usize,
            "{} workers from port {} run past port {}", self.workers, self.base_port, u16::MAX
        );
        Ok(())
    }

    pub fn fleet(&self) -> FleetConfig {
        FleetConfig {
            workers: self.workers,
            base_port: self.base_port,
            stagger: Duration::from_millis(self.stagger_ms),
            episodes: self.episodes,
            max_steps: self.max_steps,
            keep_transitions: self.keep_transitions,
            env: self.env.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn yaml_fills_only_what_it_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "workers: 2\nenv:\n  throttle: true\nscr:\n  host: sim-box\n").unwrap();
        let cfg = DriverConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.base_port, 3001);
        assert!(cfg.env.throttle);
        assert!(cfg.env.early_stop);
        assert_eq!(cfg.scr.host, "sim-box");
        assert_eq!(cfg.scr.max_connect_attempts, ScrConfig::default().max_connect_attempts);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = DriverConfig::load(Some(Path::new("/nonexistent/run.yaml"))).unwrap_err();
        assert!(format!("{err:#}").contains("read config"));
    }

    #[test]
    fn flags_override_file() {
        let cli = Cli::parse_from([
            "torcs-driver", "--workers", "5", "--base-port", "4000", "--gear-change",
            "--no-early-stop", "--out", "/tmp/x",
        ]);
        let mut cfg = DriverConfig { episodes: 7, ..DriverConfig::default() };
        cfg.apply(&cli);
        assert_eq!(cfg.workers, 5);
        assert_eq!(cfg.base_port, 4000);
        assert_eq!(cfg.episodes, 7);
        assert!(cfg.env.gear_change);
        assert!(!cfg.env.early_stop);
        assert_eq!(cfg.out_dir, PathBuf::from("/tmp/x"));

        let fleet = cfg.fleet();
        assert_eq!(fleet.port(4), Some(4004));
        assert_eq!(fleet.stagger, Duration::from_millis(500));
    }

    #[test]
    fn port_range_is_checked() {
        let cfg = DriverConfig { base_port: u16::MAX - 1, workers: 3, ..DriverConfig::default() };
        assert!(cfg.validate().is_err());
        let cfg = DriverConfig { base_port: u16::MAX - 2, workers: 3, ..DriverConfig::default() };
        assert!(cfg.validate().is_ok());
        assert!(DriverConfig { workers: 0, ..DriverConfig::default() }.validate().is_err());
    }
}
