//! Scenario definitions.
//!
//! Each scenario is a named target motion plus camera settings.
//! All scenarios are deterministic given the same seed.

use crate::{
    camera_sim::{CameraParams, CameraSampler, SampledTrack},
    target::{MotionSpec, Target},
};
use serde::{Deserialize, Serialize};

/// Which pre-defined scenario to load.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// Projectile in free flight, no bounce, no noise
    Smooth,
    /// Straight line with one sudden turn
    Kink,
    /// Two turns closer together than one window
    DoubleKink,
    /// Ball bouncing on the floor, no noise
    BouncingBall,
    /// Bouncing ball seen through a noisy camera
    NoisyBounce,
    /// Bouncing ball with dropped frames
    Gappy,
}

/// A fully configured scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub frames: usize,
    /// Seconds between frames
    pub frame_dt: f64,
    pub target: Target,
    pub camera: CameraParams,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Smooth => Self::smooth(seed),
            ScenarioKind::Kink => Self::kink(seed),
            ScenarioKind::DoubleKink => Self::double_kink(seed),
            ScenarioKind::BouncingBall => Self::bouncing_ball(seed),
            ScenarioKind::NoisyBounce => Self::noisy_bounce(seed),
            ScenarioKind::Gappy => Self::gappy(seed),
        }
    }

    /// Record the scenario through its camera.
    pub fn record(&self) -> SampledTrack {
        let mut target = self.target.clone();
        let mut camera = CameraSampler::new(self.camera.clone(), self.frame_dt, self.seed);
        camera.record(&mut target, self.frames)
    }

    fn smooth(seed: u64) -> Self {
        Self {
            name: "smooth".into(),
            seed,
            frames: 60,
            frame_dt: 1.0 / 30.0,
            target: Target::new(
                [0.0, 0.0],
                [1.5, 4.0],
                MotionSpec::ConstantAccel { ax: 0.0, ay: -9.81 },
            ),
            camera: CameraParams::default(),
        }
    }

    fn kink(seed: u64) -> Self {
        Self {
            name: "kink".into(),
            seed,
            frames: 40,
            frame_dt: 1.0,
            target: Target::new(
                [0.0, 0.0],
                [1.0, 0.0],
                MotionSpec::Kicked {
                    kicks: vec![(20.4, [0.0, 2.0])],
                },
            ),
            camera: CameraParams::default(),
        }
    }

    fn double_kink(seed: u64) -> Self {
        Self {
            name: "double_kink".into(),
            seed,
            frames: 60,
            frame_dt: 1.0,
            target: Target::new(
                [0.0, 0.0],
                [1.0, 0.0],
                MotionSpec::Kicked {
                    kicks: vec![(20.3, [0.0, 3.0]), (24.6, [0.0, -5.0])],
                },
            ),
            camera: CameraParams::default(),
        }
    }

    fn ball() -> Target {
        Target::new(
            [0.0, 1.2],
            [0.4, 0.0],
            MotionSpec::Ballistic {
                gravity: -9.81,
                floor: 0.0,
                restitution: 0.8,
            },
        )
    }

    fn bouncing_ball(seed: u64) -> Self {
        Self {
            name: "bouncing_ball".into(),
            seed,
            frames: 120,
            frame_dt: 1.0 / 30.0,
            target: Self::ball(),
            camera: CameraParams::default(),
        }
    }

    fn noisy_bounce(seed: u64) -> Self {
        Self {
            name: "noisy_bounce".into(),
            seed,
            frames: 120,
            frame_dt: 1.0 / 30.0,
            target: Self::ball(),
            camera: CameraParams {
                noise: 0.002,
                dropout: 0.0,
            },
        }
    }

    fn gappy(seed: u64) -> Self {
        Self {
            name: "gappy".into(),
            seed,
            frames: 120,
            frame_dt: 1.0 / 30.0,
            target: Self::ball(),
            camera: CameraParams {
                noise: 0.0,
                dropout: 0.08,
            },
        }
    }
}
