//! Target motion models and state propagation.
//!
//! Each target has a 2-D true state [px, py, vx, vy] and a `MotionSpec`
//! describing how it moves. Propagation is split into sub-steps so that
//! bounces and velocity kicks land between camera frames.

use serde::{Deserialize, Serialize};

/// Sub-steps per `step` call.
const SUBSTEPS: usize = 100;

/// Describes target motion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MotionSpec {
    /// No acceleration.
    ConstantVelocity,
    /// Constant acceleration `ax, ay`.
    ConstantAccel { ax: f64, ay: f64 },
    /// Falling under `gravity` (along y), bouncing off the line `y = floor`.
    /// The vertical velocity is reversed and scaled by `restitution` on impact.
    Ballistic {
        gravity: f64,
        floor: f64,
        restitution: f64,
    },
    /// Constant velocity with instantaneous velocity changes: `(time, [dvx, dvy])`.
    Kicked { kicks: Vec<(f64, [f64; 2])> },
}

/// A simulated point target with ground-truth state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Target {
    /// True state [px, py, vx, vy]
    pub state: [f64; 4],
    pub motion: MotionSpec,
    /// Times at which the velocity changed abruptly (bounces, kicks)
    #[serde(default)]
    pub events: Vec<f64>,
}

impl Target {
    pub fn new(position: [f64; 2], velocity: [f64; 2], motion: MotionSpec) -> Self {
        Self {
            state: [position[0], position[1], velocity[0], velocity[1]],
            motion,
            events: Vec::new(),
        }
    }

    /// Propagate the true state from time `t` by `dt`.
    pub fn step(&mut self, t: f64, dt: f64) {
        let h = dt / SUBSTEPS as f64;
        for k in 0..SUBSTEPS {
            let t0 = t + k as f64 * h;
            let t1 = t + (k + 1) as f64 * h;
            let [ax, ay] = self.acceleration();
            let s = &mut self.state;
            s[0] += s[2] * h + 0.5 * ax * h * h;
            s[1] += s[3] * h + 0.5 * ay * h * h;
            s[2] += ax * h;
            s[3] += ay * h;

            match &self.motion {
                MotionSpec::Ballistic {
                    floor, restitution, ..
                } => {
                    if s[1] < *floor {
                        s[1] = 2.0 * floor - s[1];
                        s[3] = -s[3] * restitution;
                        self.events.push(t1);
                    }
                }
                MotionSpec::Kicked { kicks } => {
                    for (at, dv) in kicks {
                        if *at > t0 && *at <= t1 {
                            // advance the remainder of the sub-step at the new velocity
                            let rest = t1 - at;
                            s[0] += dv[0] * rest;
                            s[1] += dv[1] * rest;
                            s[2] += dv[0];
                            s[3] += dv[1];
                            self.events.push(*at);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Smooth part of the true acceleration (impulses excluded).
    pub fn acceleration(&self) -> [f64; 2] {
        match &self.motion {
            MotionSpec::ConstantAccel { ax, ay } => [*ax, *ay],
            MotionSpec::Ballistic { gravity, .. } => [0.0, *gravity],
            MotionSpec::ConstantVelocity | MotionSpec::Kicked { .. } => [0.0, 0.0],
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.state[0], self.state[1])
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.state[2], self.state[3])
    }
}
