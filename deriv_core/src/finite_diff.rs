//! Symmetric finite differences: the baseline the bounce-aware estimator replaces.
//!
//! With `s = max(spill, 1)` and `h = s·stride` samples:
//! - v = (p[i+h] − p[i−h]) / (2s)
//! - a = (p[i+h] − 2·p[i] + p[i−h]) / s²
//!
//! Units are per step of `stride` samples, as for [`DerivativeEstimator`].
//! No window shifting: points too close to an end or to a missing sample stay NaN.
//!
//! [`DerivativeEstimator`]: crate::estimator::DerivativeEstimator

use crate::{
    algorithm::DerivativeAlgorithm,
    error::ParamsError,
    types::{DerivativeParams, Derivatives, Trajectory},
};

#[derive(Clone, Copy, Debug, Default)]
pub struct FiniteDifference;

impl DerivativeAlgorithm for FiniteDifference {
    fn name(&self) -> &'static str {
        "finite-difference"
    }

    fn differentiate(
        &self,
        trajectory: &Trajectory,
        params: &DerivativeParams,
    ) -> Result<Derivatives, ParamsError> {
        trajectory.check_lengths()?;
        if params.stride == 0 {
            return Err(ParamsError::StrideZero);
        }
        let len = trajectory.len();
        let mut out = Derivatives::nan(len);
        let (x, y) = trajectory.sanitized();
        let s = params.spill.max(1);
        let h = s * params.stride;
        let (s, s2) = (s as f64, (s * s) as f64);

        for c in 0..params.clamped_count(len) {
            let i = params.sample_index(c);
            if i < h || i + h >= len {
                continue;
            }
            let vel = [
                (x[i + h] - x[i - h]) / (2.0 * s),
                (y[i + h] - y[i - h]) / (2.0 * s),
            ];
            let acc = [
                (x[i + h] - 2.0 * x[i] + x[i - h]) / s2,
                (y[i + h] - 2.0 * y[i] + y[i - h]) / s2,
            ];
            // NaN inputs propagate on their own
            out.set(i, vel, acc);
        }
        Ok(out)
    }
}
