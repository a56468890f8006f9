//! Fundamental types shared by every estimator.

use crate::error::ParamsError;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Generic dynamic-size matrix (design matrices, pseudo-inverses, coefficients)
pub type DMat = DMatrix<f64>;

/// Degree of the local polynomial: constant-acceleration assumption.
pub const POLY_DEGREE: usize = 2;

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------

/// Uniformly sampled 2-D trajectory. Invalid samples are NaN or flagged in `valid`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Trajectory {
    #[serde(with = "nan_as_null")]
    pub x: Vec<f64>,
    #[serde(with = "nan_as_null")]
    pub y: Vec<f64>,
    pub valid: Vec<bool>,
}

impl Trajectory {
    pub fn new(x: Vec<f64>, y: Vec<f64>, valid: Vec<bool>) -> Self {
        Self { x, y, valid }
    }

    /// Build a trajectory from points; a point is valid unless a coordinate is NaN.
    pub fn from_points(points: &[(f64, f64)]) -> Self {
        let x = points.iter().map(|p| p.0).collect();
        let y = points.iter().map(|p| p.1).collect();
        let valid = points.iter().map(|p| !p.0.is_nan() && !p.1.is_nan()).collect();
        Self { x, y, valid }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Check that `x`, `y` and `valid` have the same length.
    pub fn check_lengths(&self) -> Result<(), ParamsError> {
        if self.x.len() != self.y.len() || self.x.len() != self.valid.len() {
            return Err(ParamsError::LengthMismatch {
                x: self.x.len(),
                y: self.y.len(),
                valid: self.valid.len(),
            });
        }
        Ok(())
    }

    /// Copies of `x` and `y` in which every unusable sample is NaN in both coordinates.
    pub fn sanitized(&self) -> (Vec<f64>, Vec<f64>) {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.valid)
            .map(|((&x, &y), &ok)| {
                if ok && !x.is_nan() && !y.is_nan() {
                    (x, y)
                } else {
                    (f64::NAN, f64::NAN)
                }
            })
            .unzip()
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Which samples to evaluate and how wide the local windows are.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeParams {
    /// Window half-width: window length is `2 * spill + 1`
    pub spill: usize,
    /// First evaluated sample index
    pub start: usize,
    /// Distance in samples between evaluated points (and between window samples)
    pub stride: usize,
    /// Number of evaluation points requested (clamped to the trajectory)
    pub count: usize,
}

impl Default for DerivativeParams {
    fn default() -> Self {
        Self {
            spill: 3,
            start: 0,
            stride: 1,
            count: usize::MAX,
        }
    }
}

impl DerivativeParams {
    /// Evaluate every sample with the given spill.
    pub fn every_sample(spill: usize) -> Self {
        Self {
            spill,
            ..Default::default()
        }
    }

    pub fn window_len(&self) -> usize {
        2 * self.spill + 1
    }

    /// Sample index of evaluation point `c`.
    pub fn sample_index(&self, c: usize) -> usize {
        self.start + self.stride * c
    }

    /// Number of evaluation points that fit in a trajectory of length `len`.
    pub fn clamped_count(&self, len: usize) -> usize {
        if self.start >= len || self.stride == 0 {
            return 0;
        }
        self.count.min((len - self.start) / self.stride)
    }
}

// ---------------------------------------------------------------------------
// Derivatives
// ---------------------------------------------------------------------------

/// Velocity and acceleration per sample; NaN wherever nothing was estimated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Derivatives {
    #[serde(with = "nan_as_null")]
    pub x_vel: Vec<f64>,
    #[serde(with = "nan_as_null")]
    pub y_vel: Vec<f64>,
    #[serde(with = "nan_as_null")]
    pub x_acc: Vec<f64>,
    #[serde(with = "nan_as_null")]
    pub y_acc: Vec<f64>,
}

impl Derivatives {
    /// All-NaN arrays of length `len`.
    pub fn nan(len: usize) -> Self {
        Self {
            x_vel: vec![f64::NAN; len],
            y_vel: vec![f64::NAN; len],
            x_acc: vec![f64::NAN; len],
            y_acc: vec![f64::NAN; len],
        }
    }

    pub fn len(&self) -> usize {
        self.x_vel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_vel.is_empty()
    }

    pub fn set(&mut self, i: usize, vel: [f64; 2], acc: [f64; 2]) {
        self.x_vel[i] = vel[0];
        self.y_vel[i] = vel[1];
        self.x_acc[i] = acc[0];
        self.y_acc[i] = acc[1];
    }

    pub fn velocity(&self, i: usize) -> (f64, f64) {
        (self.x_vel[i], self.y_vel[i])
    }

    pub fn acceleration(&self, i: usize) -> (f64, f64) {
        (self.x_acc[i], self.y_acc[i])
    }

    /// True if all four values at `i` were estimated.
    pub fn is_estimated(&self, i: usize) -> bool {
        !(self.x_vel[i].is_nan()
            || self.y_vel[i].is_nan()
            || self.x_acc[i].is_nan()
            || self.y_acc[i].is_nan())
    }

    /// Convert per-step derivatives to per-time-unit ones; `dt` is the time per step.
    pub fn to_time_units(mut self, dt: f64) -> Self {
        let dt2 = dt * dt;
        self.x_vel.iter_mut().for_each(|v| *v /= dt);
        self.y_vel.iter_mut().for_each(|v| *v /= dt);
        self.x_acc.iter_mut().for_each(|a| *a /= dt2);
        self.y_acc.iter_mut().for_each(|a| *a /= dt2);
        self
    }
}

/// JSON has no NaN: missing values travel as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], s: S) -> Result<S::Ok, S::Error> {
        values
            .iter()
            .map(|v| (!v.is_nan()).then_some(*v))
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(d)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}
