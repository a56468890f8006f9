//! `sim` — Synthetic trajectories: target motion, camera sampling, named scenarios, logs.

pub mod camera_sim;
pub mod replay;
pub mod scenarios;
pub mod target;

pub use camera_sim::{CameraParams, CameraSampler, SampledTrack};
pub use replay::{load_log, save_log, TrajectoryLog};
pub use scenarios::{Scenario, ScenarioKind};
pub use target::{MotionSpec, Target};
