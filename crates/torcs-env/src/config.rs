use serde::{Deserialize, Serialize};

/// Speed scale applied to the speed channels outside vision mode, km/h.
pub const SPEED_SCALE: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub vision: bool,
    /// Agent drives accel and brake itself.
    pub throttle: bool,
    /// Agent picks the gear itself.
    pub gear_change: bool,
    pub early_stop: bool,
    pub obs_dim: usize,
    pub act_dim: usize,
    /// Target speed of the automatic throttle, also the vision speed scale.
    pub default_speed: f64,
    pub port: u16,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            vision: false,
            throttle: false,
            gear_change: false,
            early_stop: true,
            obs_dim: 29,
            act_dim: 3,
            default_speed: 50.0,
            port: 3001,
        }
    }
}

impl EnvConfig {
    pub fn layout(&self) -> ActionLayout {
        ActionLayout::from_flags(self.throttle, self.gear_change)
    }

    pub fn speed_scale(&self) -> f64 {
        if self.vision { self.default_speed } else { SPEED_SCALE }
    }
}

/// Shape of the action vector for a given `(throttle, gear_change)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionLayout {
    /// `[steer]`
    Steer,
    /// `[steer, _, _, gear]`
    SteerGear,
    /// `[steer, accel, brake]`
    Pedals,
    /// `[steer, accel, brake, gear]`
    PedalsGear,
}

impl ActionLayout {
    pub fn from_flags(throttle: bool, gear_change: bool) -> Self {
        match (throttle, gear_change) {
            (false, false) => ActionLayout::Steer,
            (false, true) => ActionLayout::SteerGear,
            (true, false) => ActionLayout::Pedals,
            (true, true) => ActionLayout::PedalsGear,
        }
    }

    pub fn len(self) -> usize {
        match self {
            ActionLayout::Steer => 1,
            ActionLayout::Pedals => 3,
            ActionLayout::SteerGear | ActionLayout::PedalsGear => 4,
        }
    }

    pub fn throttle(self) -> bool {
        matches!(self, ActionLayout::Pedals | ActionLayout::PedalsGear)
    }

    pub fn gear(self) -> bool {
        matches!(self, ActionLayout::SteerGear | ActionLayout::PedalsGear)
    }

    /// Box bounds `(low, high)` the agent's outputs are trained against.
    pub fn bounds(self) -> (Vec<f64>, Vec<f64>) {
        match self {
            ActionLayout::Steer => (vec![-1.0], vec![1.0]),
            ActionLayout::Pedals => (vec![-1.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]),
            ActionLayout::SteerGear | ActionLayout::PedalsGear => {
                (vec![-1.0, 0.0, 0.0, -1.0], vec![1.0, 1.0, 1.0, 6.0])
            }
        }
    }
}
