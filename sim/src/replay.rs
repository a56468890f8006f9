//! Trajectory logs: recorded samples plus optional ground truth, stored as
//! JSON for offline evaluation.

use crate::camera_sim::SampledTrack;
use deriv_core::{DerivativeParams, Derivatives, Trajectory};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// One recorded trajectory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrajectoryLog {
    pub name: String,
    pub seed: u64,
    /// Seconds between samples
    pub frame_dt: f64,
    /// Parameters to evaluate the log with
    pub params: DerivativeParams,
    pub trajectory: Trajectory,
    /// True derivatives in per-second units, if known
    #[serde(default)]
    pub truth: Option<Derivatives>,
    /// Times of known velocity jumps, in samples
    #[serde(default)]
    pub events: Vec<f64>,
}

impl TrajectoryLog {
    pub fn from_track(
        name: impl Into<String>,
        seed: u64,
        frame_dt: f64,
        params: DerivativeParams,
        track: SampledTrack,
    ) -> Self {
        Self {
            name: name.into(),
            seed,
            frame_dt,
            params,
            trajectory: track.trajectory,
            truth: Some(track.truth),
            events: track.events,
        }
    }
}

/// Save a trajectory log to a JSON file.
pub fn save_log(log: &TrajectoryLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a trajectory log from a JSON file.
pub fn load_log(path: &Path) -> anyhow::Result<TrajectoryLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: TrajectoryLog = serde_json::from_reader(reader)?;
    log.trajectory.check_lengths()?;
    Ok(log)
}
