//! Camera sampling simulator.
//!
//! Records a target once per frame with:
//! - Uniform position noise of half-width `noise`
//! - Dropped frames with probability `dropout` (sample marked invalid)
//!
//! Ground truth is kept alongside: velocity and smooth acceleration per frame,
//! in units per second.

use crate::target::Target;
use deriv_core::{Derivatives, Trajectory};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Camera imperfections.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CameraParams {
    /// Half-width of the uniform position noise (same units as positions)
    pub noise: f64,
    /// Probability that a frame is lost
    pub dropout: f64,
}

/// A sampled trajectory with its ground truth.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SampledTrack {
    pub trajectory: Trajectory,
    /// True derivatives per frame (per second, per second²)
    pub truth: Derivatives,
    /// Times of abrupt velocity changes, in frames
    pub events: Vec<f64>,
}

/// Samples targets frame by frame.
pub struct CameraSampler {
    pub params: CameraParams,
    /// Seconds between frames
    pub frame_dt: f64,
    rng: ChaCha8Rng,
}

impl CameraSampler {
    pub fn new(params: CameraParams, frame_dt: f64, seed: u64) -> Self {
        Self {
            params,
            frame_dt,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Record `frames` frames of `target`, starting at time 0.
    pub fn record(&mut self, target: &mut Target, frames: usize) -> SampledTrack {
        let dt = self.frame_dt;
        let mut x = Vec::with_capacity(frames);
        let mut y = Vec::with_capacity(frames);
        let mut valid = Vec::with_capacity(frames);
        let mut truth = Derivatives::nan(frames);

        for frame in 0..frames {
            let (px, py) = target.position();
            let (vx, vy) = target.velocity();
            truth.set(frame, [vx, vy], target.acceleration());

            let lost = self.params.dropout > 0.0 && self.rng.gen::<f64>() < self.params.dropout;
            if lost {
                x.push(f64::NAN);
                y.push(f64::NAN);
                valid.push(false);
            } else {
                let n = self.params.noise;
                x.push(px + self.rng.gen::<f64>() * n * 2.0 - n);
                y.push(py + self.rng.gen::<f64>() * n * 2.0 - n);
                valid.push(true);
            }

            target.step(frame as f64 * dt, dt);
        }

        let events = target.events.iter().map(|t| t / dt).collect();
        SampledTrack {
            trajectory: Trajectory::new(x, y, valid),
            truth,
            events,
        }
    }
}
