mod cli;
mod config;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use model::EpisodeRecord;
use serde_json::json;
use std::path::{Path, PathBuf};
use torcs_env::{run_fleet, record_channel, LaneKeeper, RecordRx};
use torcs_link_scr::ScrClient;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::DriverConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Some(Commands::Summarize { path, window }) => summarize(path, *window),
        Some(Commands::Run) | None => {
            let mut cfg = DriverConfig::load(cli.config.as_deref())?;
            cfg.apply(&cli);
            cfg.validate()?;
            drive(cfg).await
        }
    }
}

async fn drive(cfg: DriverConfig) -> Result<()> {
    std::fs::create_dir_all(&cfg.out_dir)
        .with_context(|| format!("create {}", cfg.out_dir.display()))?;

    let (tx, rx) = record_channel();
    let out_dir = cfg.out_dir.clone();
    let writer = std::thread::spawn(move || write_records(rx, &out_dir));

    info!(
        workers = cfg.workers, base_port = cfg.base_port, episodes = cfg.episodes,
        vision = cfg.env.vision, throttle = cfg.env.throttle, gear_change = cfg.env.gear_change,
        "starting fleet"
    );
    let scr = cfg.scr.clone();
    let outcomes = run_fleet(
        cfg.fleet(),
        move |_| ScrClient::new(scr.clone()),
        |_, env| LaneKeeper::new(env),
        tx,
    )
    .await;

    let records = writer.join().map_err(|_| anyhow!("record writer panicked"))??;

    let mut failed = 0;
    for o in &outcomes {
        if let Err(e) = &o.result {
            failed += 1;
            warn!(worker = o.worker, port = o.port, error = %e, "worker failed");
        }
    }

    let report = json!({
        "summary": analysis::run_summary(&records),
        "workers": analysis::per_worker(&records),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if failed > 0 && failed == outcomes.len() {
        bail!("all {failed} workers failed");
    }
    Ok(())
}

/// Drains the record channel until every worker has hung up.
fn write_records(rx: RecordRx, out_dir: &Path) -> Result<Vec<EpisodeRecord>> {
    let episodes_path = out_dir.join("episodes.ndjson");
    let mut episodes = iox::EpisodeWriter::create(&episodes_path)?;
    let mut records = Vec::new();
    for rec in rx.iter() {
        debug!(worker = rec.worker, episode = rec.episode, steps = rec.steps, "episode recorded");
        episodes.append(&rec)?;
        records.push(rec);
    }
    episodes.finish()?;

    let transitions_path: PathBuf = out_dir.join("transitions.csv");
    iox::export_transitions_csv(&records, &transitions_path)?;
    info!(
        episodes = records.len(),
        path = %episodes_path.display(),
        "run log written"
    );
    Ok(records)
}

fn summarize(path: &Path, window: usize) -> Result<()> {
    let records = iox::import_ndjson(path)?;
    let report = json!({
        "summary": analysis::run_summary(&records),
        "workers": analysis::per_worker(&records),
        "reward_curve": analysis::reward_curve(&records, window),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
