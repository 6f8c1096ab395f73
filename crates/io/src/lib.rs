use anyhow::{Context, Result};
use std::{fs::File, io::{BufRead, Write}, path::Path};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use model::*;

pub fn import_ndjson(path: &Path) -> Result<Vec<EpisodeRecord>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = std::io::BufReader::new(f);
    let mut recs = vec![];
    for (n, line) in rdr.lines().enumerate() {
        let s = line?;
        if s.trim().is_empty() { continue; }
        let r: EpisodeRecord = serde_json::from_str(&s)
            .with_context(|| format!("{}:{}", path.display(), n + 1))?;
        recs.push(r);
    }
    Ok(recs)
}

pub fn export_ndjson(recs: &[EpisodeRecord], path: &Path) -> Result<()> {
    let mut w = EpisodeWriter::create(path)?;
    for r in recs {
        w.append(r)?;
    }
    w.finish()
}

/// Appends episodes to an NDJSON file as they complete.
pub struct EpisodeWriter {
    w: std::io::BufWriter<File>,
}

impl EpisodeWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self { w: std::io::BufWriter::new(f) })
    }

    pub fn append(&mut self, r: &EpisodeRecord) -> Result<()> {
        let s = serde_json::to_string(r)?;
        writeln!(self.w, "{}", s)?;
        // one flush per episode so a crash loses at most the running ones
        self.w.flush()?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }
}

/// One row per transition, carrying its episode's identity.
pub fn export_transitions_csv(recs: &[EpisodeRecord], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for r in recs {
        for t in &r.transitions {
            w.serialize(CsvRow {
                episode_id: r.id.simple().to_string(),
                worker: r.worker,
                port: r.port,
                episode: r.episode,
                started_at: r.started_at.clone(),
                tick: t.tick,
                reward: t.reward,
                terminal: t.terminal,
                collision: t.collision,
                cause: t.cause.clone(),
                speed_x: t.speed_x,
                angle: t.angle,
                track_pos: t.track_pos,
                fuel: t.fuel,
            })?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Rebuilds episodes from a transitions CSV; totals are recomputed from the rows.
pub fn import_transitions_csv(path: &Path) -> Result<Vec<EpisodeRecord>> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let mut recs = Vec::<EpisodeRecord>::new();
    let mut current: Option<EpisodeRecord> = None;
    for row in rdr.deserialize() {
        let r: CsvRow = row?;
        let id = Uuid::parse_str(&r.episode_id)
            .with_context(|| format!("bad episode id {}", r.episode_id))?;
        if current.as_ref().map(|e| e.id) != Some(id) {
            if let Some(e) = current.take() { recs.push(e); }
            current = Some(new_episode(id, &r));
        }
        if let Some(e) = &mut current {
            e.steps += 1;
            e.total_reward += r.reward;
            if r.collision { e.collisions += 1; }
            if r.terminal || r.cause.is_some() { e.termination = r.cause.clone(); }
            e.transitions.push(TransitionRecord {
                tick: r.tick, reward: r.reward, terminal: r.terminal, collision: r.collision,
                cause: r.cause, speed_x: r.speed_x, angle: r.angle, track_pos: r.track_pos, fuel: r.fuel,
            });
        }
    }
    if let Some(e) = current.take() { recs.push(e); }
    Ok(recs)
}

fn new_episode(id: Uuid, r: &CsvRow) -> EpisodeRecord {
    EpisodeRecord {
        id,
        worker: r.worker,
        port: r.port,
        episode: r.episode,
        started_at: r.started_at.clone(),
        steps: 0,
        total_reward: 0.0,
        collisions: 0,
        termination: None,
        transitions: vec![],
    }
}

#[derive(Serialize, Deserialize)]
struct CsvRow {
    episode_id: String, worker: usize, port: u16, episode: u32, started_at: String,
    tick: u64, reward: f64, terminal: bool, collision: bool, cause: Option<String>,
    speed_x: Option<f64>, angle: Option<f64>, track_pos: Option<f64>, fuel: Option<f64>,
}
