use crate::action::auto_gear;
use crate::config::{ActionLayout, EnvConfig};
use crate::observation::Observation;

/// Anything that maps an observation to an action vector.
pub trait Policy: Send {
    fn select_action(&mut self, obs: &Observation) -> Vec<f64>;
}

impl<F> Policy for F
where
    F: FnMut(&Observation) -> Vec<f64> + Send,
{
    fn select_action(&mut self, obs: &Observation) -> Vec<f64> {
        self(obs)
    }
}

/// Proportional lane keeper: steers toward the track axis and holds a cruise speed.
#[derive(Debug, Clone)]
pub struct LaneKeeper {
    layout: ActionLayout,
    speed_scale: f64,
    pub cruise_kmh: f64,
    pub heading_gain: f64,
    pub offset_gain: f64,
}

impl LaneKeeper {
    pub fn new(cfg: &EnvConfig) -> Self {
        Self {
            layout: cfg.layout(),
            speed_scale: cfg.speed_scale(),
            cruise_kmh: 100.0,
            heading_gain: 10.0,
            offset_gain: 0.1,
        }
    }

    pub fn steer(&self, obs: &Observation) -> f64 {
        // angle is already divided by pi
        (obs.angle * self.heading_gain - obs.track_pos * self.offset_gain).clamp(-1.0, 1.0)
    }

    fn pedals(&self, speed_kmh: f64, steer: f64) -> (f64, f64) {
        let target = self.cruise_kmh * (1.0 - 0.5 * steer.abs());
        if speed_kmh > target * 1.2 {
            (0.0, 0.3)
        } else {
            (((target - speed_kmh) / target).clamp(0.0, 1.0), 0.0)
        }
    }
}

impl Policy for LaneKeeper {
    fn select_action(&mut self, obs: &Observation) -> Vec<f64> {
        let steer = self.steer(obs);
        let speed_kmh = obs.speed_x * self.speed_scale;
        let (accel, brake) = self.pedals(speed_kmh, steer);
        let gear = auto_gear(speed_kmh) as f64;
        match self.layout {
            ActionLayout::Steer => vec![steer],
            ActionLayout::SteerGear => vec![steer, 0.0, 0.0, gear],
            ActionLayout::Pedals => vec![steer, accel, brake],
            ActionLayout::PedalsGear => vec![steer, accel, brake, gear],
        }
    }
}
