//! Accuracy metrics: RMSE of velocity and acceleration against ground truth.

use crate::types::Derivatives;
use serde::{Deserialize, Serialize};

/// Accumulated error statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DerivativeMetrics {
    /// Points with ground truth available
    pub n_points: u64,
    /// Points with ground truth but no estimate (NaN output)
    pub n_missing: u64,
    /// Points compared
    pub n_compared: u64,
    /// Sum of squared velocity errors (2D)
    pub sum_sq_vel_err: f64,
    /// Sum of squared acceleration errors (2D)
    pub sum_sq_acc_err: f64,
    /// Largest 2D velocity error seen
    pub max_vel_err: f64,
}

impl DerivativeMetrics {
    /// Root-mean-square velocity error.
    pub fn rmse_velocity(&self) -> f64 {
        if self.n_compared == 0 {
            return 0.0;
        }
        (self.sum_sq_vel_err / self.n_compared as f64).sqrt()
    }

    /// Root-mean-square acceleration error.
    pub fn rmse_acceleration(&self) -> f64 {
        if self.n_compared == 0 {
            return 0.0;
        }
        (self.sum_sq_acc_err / self.n_compared as f64).sqrt()
    }

    /// Fraction of points with truth that received an estimate.
    pub fn coverage(&self) -> f64 {
        if self.n_points == 0 {
            1.0
        } else {
            self.n_compared as f64 / self.n_points as f64
        }
    }

    /// Compare `estimate` with `truth` sample by sample. NaN in `truth` means unknown.
    pub fn accumulate(&mut self, estimate: &Derivatives, truth: &Derivatives) {
        for i in 0..estimate.len().min(truth.len()) {
            if !truth.is_estimated(i) {
                continue;
            }
            self.n_points += 1;
            if !estimate.is_estimated(i) {
                self.n_missing += 1;
                continue;
            }
            let (vx, vy) = estimate.velocity(i);
            let (tvx, tvy) = truth.velocity(i);
            let (ax, ay) = estimate.acceleration(i);
            let (tax, tay) = truth.acceleration(i);
            let vel_sq = (vx - tvx).powi(2) + (vy - tvy).powi(2);
            self.sum_sq_vel_err += vel_sq;
            self.sum_sq_acc_err += (ax - tax).powi(2) + (ay - tay).powi(2);
            self.max_vel_err = self.max_vel_err.max(vel_sq.sqrt());
            self.n_compared += 1;
        }
    }
}
