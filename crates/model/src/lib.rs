use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TransitionRecord {
    pub tick: u64,
    pub reward: f64,
    pub terminal: bool,
    pub collision: bool,
    #[serde(default)]
    pub cause: Option<String>,
    // normalized observation channels, absent when the session died
    #[serde(default)]
    pub speed_x: Option<f64>,
    #[serde(default)]
    pub angle: Option<f64>,
    #[serde(default)]
    pub track_pos: Option<f64>,
    #[serde(default)]
    pub fuel: Option<f64>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct EpisodeRecord {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    pub worker: usize,
    pub port: u16,
    pub episode: u32,
    pub started_at: String,
    pub steps: u64,
    pub total_reward: f64,
    pub collisions: u32,
    pub termination: Option<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl EpisodeRecord {
    pub fn new(worker: usize, port: u16, episode: u32, started_at: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            worker, port, episode, started_at,
            steps: 0,
            total_reward: 0.0,
            collisions: 0,
            termination: None,
            transitions: vec![],
        }
    }

    pub fn mean_reward(&self) -> f64 {
        if self.steps == 0 { 0.0 } else { self.total_reward / self.steps as f64 }
    }
}
