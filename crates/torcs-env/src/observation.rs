//! Raw telemetry to normalized observation.

use std::f64::consts::PI;
use torcs_link_core::RawTelemetry;

use crate::config::EnvConfig;
use crate::error::EnvError;

pub const IMAGE_SIDE: usize = 64;
pub const IMAGE_PLANE: usize = IMAGE_SIDE * IMAGE_SIDE;

const RANGE_SCALE: f64 = 200.0;
const RPM_SCALE: f64 = 10_000.0;

/// Camera frame split into row-major R, G and B planes of 64x64.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbImage {
    pub planes: [Vec<u8>; 3],
}

impl RgbImage {
    /// De-interleaves an `RGBRGB...` buffer.
    pub fn from_interleaved(buf: &[u8]) -> Result<Self, EnvError> {
        let expected = 3 * IMAGE_PLANE;
        if buf.len() != expected {
            return Err(EnvError::ImageShape { expected, got: buf.len() });
        }
        let plane = |c: usize| buf.iter().skip(c).step_by(3).copied().collect::<Vec<u8>>();
        Ok(Self { planes: [plane(0), plane(1), plane(2)] })
    }

    pub fn pixel(&self, channel: usize, row: usize, col: usize) -> u8 {
        self.planes[channel][row * IMAGE_SIDE + col]
    }
}

/// The channel that differs between plain and vision observations.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeChannel {
    Damage(f64),
    Image(RgbImage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub focus: Vec<f64>,
    pub speed_x: f64,
    pub speed_y: f64,
    pub speed_z: f64,
    pub angle: f64,
    pub opponents: Vec<f64>,
    /// Scaled by 1/10000 in plain mode, raw in vision mode.
    pub rpm: f64,
    pub track: Vec<f64>,
    pub track_pos: f64,
    pub wheel_spin_vel: Vec<f64>,
    pub fuel: f64,
    pub channel: ModeChannel,
}

fn scaled(v: &[f64], by: f64) -> Vec<f64> {
    v.iter().map(|x| x / by).collect()
}

impl Observation {
    pub fn from_telemetry(raw: &RawTelemetry, cfg: &EnvConfig) -> Result<Self, EnvError> {
        let speed = cfg.speed_scale();
        let (rpm, channel) = if cfg.vision {
            let img = raw.img.as_deref().unwrap_or_default();
            (raw.rpm, ModeChannel::Image(RgbImage::from_interleaved(img)?))
        } else {
            (raw.rpm / RPM_SCALE, ModeChannel::Damage(raw.damage))
        };
        Ok(Self {
            focus: scaled(&raw.focus, RANGE_SCALE),
            speed_x: raw.speed_x / speed,
            speed_y: raw.speed_y / speed,
            speed_z: raw.speed_z / speed,
            angle: raw.angle / PI,
            opponents: scaled(&raw.opponents, RANGE_SCALE),
            rpm,
            track: scaled(&raw.track, RANGE_SCALE),
            track_pos: raw.track_pos,
            wheel_spin_vel: raw.wheel_spin_vel.clone(),
            fuel: raw.fuel,
            channel,
        })
    }

    pub fn damage(&self) -> Option<f64> {
        match self.channel {
            ModeChannel::Damage(d) => Some(d),
            ModeChannel::Image(_) => None,
        }
    }

    pub fn image(&self) -> Option<&RgbImage> {
        match &self.channel {
            ModeChannel::Image(img) => Some(img),
            ModeChannel::Damage(_) => None,
        }
    }

    /// Flat agent input: angle, track, track_pos, speeds, wheel spin/100, rpm, fuel/100.
    pub fn state_vector(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(self.track.len() + self.wheel_spin_vel.len() + 7);
        v.push(self.angle);
        v.extend_from_slice(&self.track);
        v.push(self.track_pos);
        v.extend([self.speed_x, self.speed_y, self.speed_z]);
        v.extend(self.wheel_spin_vel.iter().map(|w| w / 100.0));
        v.push(self.rpm);
        v.push(self.fuel / 100.0);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torcs_link_core::{TRACK_SENSORS, WHEELS};

    fn raw() -> RawTelemetry {
        RawTelemetry {
            angle: 0.3, speed_x: 150.0, speed_y: -30.0, speed_z: 3.0,
            rpm: 5000.0, damage: 12.0, fuel: 80.0, track_pos: -0.4,
            track: vec![100.0; TRACK_SENSORS],
            wheel_spin_vel: vec![50.0, 50.0, 60.0, 60.0],
            ..RawTelemetry::default()
        }
    }

    #[test]
    fn plain_mode_scales_channels() {
        let o = Observation::from_telemetry(&raw(), &EnvConfig::default()).unwrap();
        assert_eq!(o.speed_x, 0.5);
        assert_eq!(o.speed_y, -0.1);
        assert_eq!(o.rpm, 0.5);
        assert_eq!(o.track, vec![0.5; TRACK_SENSORS]);
        assert_eq!(o.opponents[0], 1.0);
        assert_eq!(o.track_pos, -0.4);
        assert_eq!(o.fuel, 80.0);
        assert_eq!(o.damage(), Some(12.0));
        assert!(o.image().is_none());
    }

    #[test]
    fn angle_is_scaled_by_pi() {
        let mut t = raw();
        t.angle = 0.0;
        let cfg = EnvConfig::default();
        assert_eq!(Observation::from_telemetry(&t, &cfg).unwrap().angle, 0.0);
        t.angle = PI;
        let a = Observation::from_telemetry(&t, &cfg).unwrap().angle;
        assert!((a - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normalization_is_deterministic() {
        let cfg = EnvConfig::default();
        let a = Observation::from_telemetry(&raw(), &cfg).unwrap();
        let b = Observation::from_telemetry(&raw(), &cfg).unwrap();
        assert_eq!(a, b);
        let bits = |o: &Observation| o.state_vector().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn vision_mode_keeps_rpm_raw_and_splits_image() {
        let mut t = raw();
        t.img = Some((0..3 * IMAGE_PLANE).map(|i| (i % 3) as u8 * 100).collect());
        let cfg = EnvConfig { vision: true, ..EnvConfig::default() };
        let o = Observation::from_telemetry(&t, &cfg).unwrap();
        assert_eq!(o.rpm, 5000.0);
        assert_eq!(o.speed_x, 3.0);
        assert!(o.damage().is_none());
        let img = o.image().unwrap();
        assert_eq!(img.planes[0].len(), IMAGE_PLANE);
        assert_eq!(img.pixel(0, 10, 10), 0);
        assert_eq!(img.pixel(1, 63, 0), 100);
        assert_eq!(img.pixel(2, 0, 63), 200);
    }

    #[test]
    fn vision_mode_rejects_wrong_image_size() {
        let mut t = raw();
        t.img = Some(vec![0; 10]);
        let cfg = EnvConfig { vision: true, ..EnvConfig::default() };
        assert!(matches!(
            Observation::from_telemetry(&t, &cfg),
            Err(EnvError::ImageShape { expected: 12288, got: 10 })
        ));
    }

    #[test]
    fn state_vector_layout() {
        let o = Observation::from_telemetry(&raw(), &EnvConfig::default()).unwrap();
        let v = o.state_vector();
        assert_eq!(v.len(), 1 + TRACK_SENSORS + 1 + 3 + WHEELS + 2);
        assert_eq!(v[TRACK_SENSORS + 1], -0.4);
        assert_eq!(v[TRACK_SENSORS + 5], 0.5);
        assert_eq!(*v.last().unwrap(), 0.8);
    }
}
