use std::collections::BTreeMap;

use model::*;
use serde_json::{json, Value};

pub fn run_summary(records: &[EpisodeRecord]) -> Value {
    let rewards: Vec<f64> = records.iter().map(|r| r.total_reward).collect();
    let (best, worst) = if rewards.is_empty() {
        (0.0, 0.0)
    } else {
        (
            rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            rewards.iter().copied().fold(f64::INFINITY, f64::min),
        )
    };
    let avg = mean(&rewards);
    let avg_steps = if records.is_empty() {
        0.0
    } else {
        records.iter().map(|r| r.steps as f64).sum::<f64>() / records.len() as f64
    };

    json!({
        "episodes": records.len(),
        "best_reward": best,
        "worst_reward": worst,
        "avg_reward": avg,
        "reward_stddev": stddev(&rewards),
        "avg_steps": avg_steps,
        "collisions": records.iter().map(|r| r.collisions as u64).sum::<u64>(),
        "causes": cause_counts(records),
    })
}

fn cause_counts(records: &[EpisodeRecord]) -> Value {
    let mut counts = BTreeMap::<String, u64>::new();
    for r in records {
        let key = r.termination.clone().unwrap_or_else(|| "unknown".into());
        *counts.entry(key).or_default() += 1;
    }
    json!(counts)
}

/// Moving average of episode reward, in the order episodes were recorded.
pub fn reward_curve(records: &[EpisodeRecord], window: usize) -> Value {
    let window = window.max(1);
    let mut rows = Vec::with_capacity(records.len());
    for (i, r) in records.iter().enumerate() {
        let from = (i + 1).saturating_sub(window);
        let slice: Vec<f64> = records[from..=i].iter().map(|r| r.total_reward).collect();
        rows.push(json!({
            "index": i,
            "worker": r.worker,
            "reward": r.total_reward,
            "moving_avg": mean(&slice),
        }));
    }
    Value::Array(rows)
}

pub fn per_worker(records: &[EpisodeRecord]) -> Value {
    let mut by_worker = BTreeMap::<usize, Vec<&EpisodeRecord>>::new();
    for r in records {
        by_worker.entry(r.worker).or_default().push(r);
    }

    let rows = by_worker.into_iter().map(|(worker, recs)| {
        let rewards: Vec<f64> = recs.iter().map(|r| r.total_reward).collect();
        json!({
            "worker": worker,
            "port": recs[0].port,
            "episodes": recs.len(),
            "steps": recs.iter().map(|r| r.steps).sum::<u64>(),
            "avg_reward": mean(&rewards),
            "hard_resets": recs.iter().filter(|r| r.termination.as_deref() == Some("hardReset")).count(),
        })
    }).collect();
    Value::Array(rows)
}


fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / (v.len() as f64)
}

fn stddev(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let m = mean(v);
    let var = v.iter().map(|x| {
        let d = *x - m;
        d * d
    }).sum::<f64>() / (v.len() as f64);
    var.sqrt()
}
