//! Local least-squares models fitted to one window of a trajectory.
//!
//! # Basis
//! Window-relative time runs over the integers `t = 0..n-1`. Every model has
//! the polynomial columns `1, t, t²` (degree [`POLY_DEGREE`]). Step variants
//! add a velocity step at `s`:
//!
//! | variant        | extra columns                         |
//! |----------------|---------------------------------------|
//! | `Plain`        | none                                  |
//! | `KnownStep(s)` | `max(0, t − s)`                       |
//! | `UnknownStep`  | `max(0, t − s)`, `[t ≥ s]`, s = (n+1)/2 |
//!
//! For `UnknownStep` the true step time is `s − extra/dv`, which lies in
//! `(s − 1, s]`: only steps between the two samples around `s` are searched.
//!
//! The design matrix and its pseudo-inverse are built once per shape; a fit is
//! then a single `pinv · data` product.

use crate::error::ModelError;
use crate::types::{DMat, POLY_DEGREE};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Variant and tolerances
// ---------------------------------------------------------------------------

/// Which basis a [`LocalModel`] uses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModelVariant {
    /// Polynomial only
    Plain,
    /// Polynomial plus a velocity step at a fixed window-relative time
    KnownStep { step_at: f64 },
    /// Polynomial plus a velocity step whose time is estimated from the data
    UnknownStep,
}

impl ModelVariant {
    fn extra_columns(&self) -> usize {
        match self {
            ModelVariant::Plain => 0,
            ModelVariant::KnownStep { .. } => 1,
            ModelVariant::UnknownStep => 2,
        }
    }

    /// True if the basis contains a step column.
    pub fn encodes_step(&self) -> bool {
        !matches!(self, ModelVariant::Plain)
    }
}

/// Numerical tolerances used when building and refining models.
#[derive(Clone, Copy, Debug)]
pub struct FitTolerances {
    /// Singular values at or below this are treated as zero
    pub rank_eps: f64,
    /// Margin kept between a candidate step time and the window ends
    pub step_clamp_eps: f64,
}

impl Default for FitTolerances {
    fn default() -> Self {
        Self {
            rank_eps: 1e-10,
            step_clamp_eps: 1e-3,
        }
    }
}

// ---------------------------------------------------------------------------
// LocalModel
// ---------------------------------------------------------------------------

/// Immutable basis for one window shape, with its precomputed pseudo-inverse.
#[derive(Clone, Debug)]
pub struct LocalModel {
    window_len: usize,
    degree: usize,
    variant: ModelVariant,
    /// Step location used by the basis (NaN for `Plain`)
    step_at: f64,
    tolerances: FitTolerances,
    /// n × p
    design: DMat,
    /// p × n
    pinv: DMat,
}

impl LocalModel {
    /// Build the design matrix for `window_len` samples and pseudo-invert it.
    pub fn build(
        window_len: usize,
        degree: usize,
        variant: ModelVariant,
        tolerances: FitTolerances,
    ) -> Result<Self, ModelError> {
        let step_at = match variant {
            ModelVariant::Plain => f64::NAN,
            ModelVariant::KnownStep { step_at } => {
                if !(step_at > 0.0 && step_at < window_len.saturating_sub(1) as f64) {
                    return Err(ModelError::IllegalStep {
                        step_at,
                        window_len,
                    });
                }
                step_at
            }
            ModelVariant::UnknownStep => ((window_len + 1) / 2) as f64,
        };

        let cols = degree + 1 + variant.extra_columns();
        let design = DMat::from_fn(window_len, cols, |row, col| {
            let t = row as f64;
            if col <= degree {
                t.powi(col as i32)
            } else if col == degree + 1 {
                (t - step_at).max(0.0)
            } else if t >= step_at {
                1.0
            } else {
                0.0
            }
        });

        let svd = design.clone().svd(true, true);
        let rank = svd.rank(tolerances.rank_eps);
        if rank < cols {
            return Err(ModelError::RankDeficient {
                rows: window_len,
                cols,
                rank,
            });
        }
        let pinv = svd
            .pseudo_inverse(tolerances.rank_eps)
            .map_err(ModelError::PseudoInverse)?;

        Ok(Self {
            window_len,
            degree,
            variant,
            step_at,
            tolerances,
            design,
            pinv,
        })
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    /// Step location encoded in the basis; NaN for `Plain`.
    pub fn step_at(&self) -> f64 {
        self.step_at
    }

    pub fn num_params(&self) -> usize {
        self.design.ncols()
    }

    pub fn design(&self) -> &DMat {
        &self.design
    }

    pub fn pseudo_inverse(&self) -> &DMat {
        &self.pinv
    }

    /// Fit the window starting at sample `first` with sample spacing `stride`.
    ///
    /// Returns `None` if any addressed sample is out of range or NaN. For
    /// `UnknownStep` the result is the best of the known-step refits at the
    /// estimated step time(s), see [`LocalModel::refine_step`].
    pub fn fit(self: &Arc<Self>, x: &[f64], y: &[f64], first: isize, stride: usize) -> Option<FitResult> {
        let data = self.window_data(x, y, first, stride, None)?;
        let initial = self.solve(data.clone(), None);
        if self.variant == ModelVariant::UnknownStep {
            Some(self.refine_step(&data, initial))
        } else {
            Some(initial)
        }
    }

    /// Fit a `Plain` model to data with a known velocity step subtracted first.
    ///
    /// The result remembers `(pre_step_at, pre_step_size)` as its step.
    ///
    /// # Panics
    /// If the model already encodes a step, which would count it twice.
    pub fn fit_with_step(
        self: &Arc<Self>,
        x: &[f64],
        y: &[f64],
        first: isize,
        stride: usize,
        pre_step_at: f64,
        pre_step_size: [f64; 2],
    ) -> Option<FitResult> {
        assert!(
            !self.variant.encodes_step(),
            "pre-subtracted step fit requested on a {:?} model",
            self.variant
        );
        let step = StepOverride {
            at: pre_step_at,
            size: pre_step_size,
        };
        let data = self.window_data(x, y, first, stride, Some(step))?;
        Some(self.solve(data, Some(step)))
    }

    /// Gather the n × 2 data matrix, subtracting `pre_step` if given.
    fn window_data(
        &self,
        x: &[f64],
        y: &[f64],
        first: isize,
        stride: usize,
        pre_step: Option<StepOverride>,
    ) -> Option<DMat> {
        let mut data = DMat::zeros(self.window_len, 2);
        for k in 0..self.window_len {
            let idx = usize::try_from(first + (stride * k) as isize).ok()?;
            let (px, py) = (*x.get(idx)?, *y.get(idx)?);
            if px.is_nan() || py.is_nan() {
                return None;
            }
            let (dx, dy) = match pre_step {
                Some(step) => {
                    let ramp = (k as f64 - step.at).max(0.0);
                    (step.size[0] * ramp, step.size[1] * ramp)
                }
                None => (0.0, 0.0),
            };
            data[(k, 0)] = px - dx;
            data[(k, 1)] = py - dy;
        }
        Some(data)
    }

    fn solve(self: &Arc<Self>, data: DMat, step_override: Option<StepOverride>) -> FitResult {
        let coefficients = &self.pinv * &data;
        let residual = &self.design * &coefficients - data;
        FitResult {
            model: Arc::clone(self),
            coefficients,
            error: residual.norm_squared(),
            step_override,
        }
    }

    /// Re-fit known-step models at the step times implied by an unknown-step fit.
    ///
    /// Candidates, in order: x estimate, y estimate, dv²-weighted combination.
    /// The first candidate with the lowest error wins. With no usable
    /// candidate the unknown-step fit itself is returned; its `step_at()` is 0.
    fn refine_step(&self, data: &DMat, initial: FitResult) -> FitResult {
        let d = self.degree;
        let mut candidates = Vec::with_capacity(3);
        for dim in 0..2 {
            let dv = initial.coefficients[(d + 1, dim)];
            if dv != 0.0 {
                let extra = initial.coefficients[(d + 2, dim)];
                candidates.push(self.clamp_step(self.step_at - extra / dv));
            }
        }
        if let Some(combined) = weighted_step_time(&initial.coefficients, self.step_at, d) {
            candidates.push(self.clamp_step(combined));
        }

        let mut best: Option<FitResult> = None;
        for step_at in candidates {
            let Ok(model) = LocalModel::build(
                self.window_len,
                d,
                ModelVariant::KnownStep { step_at },
                self.tolerances,
            ) else {
                continue;
            };
            let refit = Arc::new(model).solve(data.clone(), None);
            if best.as_ref().map_or(true, |b| refit.error < b.error) {
                best = Some(refit);
            }
        }
        best.unwrap_or(initial)
    }

    fn clamp_step(&self, step_at: f64) -> f64 {
        let eps = self.tolerances.step_clamp_eps;
        step_at.clamp(eps, self.window_len as f64 - 1.0 - eps)
    }
}

/// dv²-weighted mean over dimensions of `step_at − extra/dv`; `None` if every dv is 0.
fn weighted_step_time(coefficients: &DMat, step_at: f64, degree: usize) -> Option<f64> {
    let (mut weight, mut sum) = (0.0, 0.0);
    for dim in 0..coefficients.ncols() {
        let dv = coefficients[(degree + 1, dim)];
        if dv != 0.0 {
            let extra = coefficients[(degree + 2, dim)];
            weight += dv * dv;
            sum += dv * dv * (step_at - extra / dv);
        }
    }
    (weight > 0.0).then(|| sum / weight)
}

// ---------------------------------------------------------------------------
// Model cache
// ---------------------------------------------------------------------------

/// The two fixed-shape models every window needs, built once per evaluation.
#[derive(Clone, Debug)]
pub struct ModelCache {
    plain: Arc<LocalModel>,
    unknown_step: Arc<LocalModel>,
}

impl ModelCache {
    pub fn new(window_len: usize, tolerances: FitTolerances) -> Result<Self, ModelError> {
        Ok(Self {
            plain: Arc::new(LocalModel::build(
                window_len,
                POLY_DEGREE,
                ModelVariant::Plain,
                tolerances,
            )?),
            unknown_step: Arc::new(LocalModel::build(
                window_len,
                POLY_DEGREE,
                ModelVariant::UnknownStep,
                tolerances,
            )?),
        })
    }

    pub fn plain(&self) -> &Arc<LocalModel> {
        &self.plain
    }

    pub fn unknown_step(&self) -> &Arc<LocalModel> {
        &self.unknown_step
    }
}

// ---------------------------------------------------------------------------
// FitResult
// ---------------------------------------------------------------------------

/// A step subtracted from the data before a plain fit.
#[derive(Clone, Copy, Debug, PartialEq)]
struct StepOverride {
    at: f64,
    size: [f64; 2],
}

/// Coefficients and residual of one model fitted to one window.
#[derive(Clone, Debug)]
pub struct FitResult {
    model: Arc<LocalModel>,
    /// p × 2, one column per dimension
    coefficients: DMat,
    /// Sum of squared residuals over both dimensions
    error: f64,
    step_override: Option<StepOverride>,
}

impl FitResult {
    pub fn model(&self) -> &LocalModel {
        &self.model
    }

    pub fn coefficients(&self) -> &DMat {
        &self.coefficients
    }

    pub fn error(&self) -> f64 {
        self.error
    }

    pub fn uses_step(&self) -> bool {
        self.model.variant.encodes_step() || self.step_override.is_some()
    }

    /// Window-relative step time.
    ///
    /// 0 means an unknown-step fit found no step; NaN means the fit has no step at all.
    pub fn step_at(&self) -> f64 {
        if let Some(step) = self.step_override {
            return step.at;
        }
        match self.model.variant {
            ModelVariant::UnknownStep => {
                weighted_step_time(&self.coefficients, self.model.step_at, self.model.degree)
                    .unwrap_or(0.0)
            }
            _ => self.model.step_at,
        }
    }

    /// Velocity jump per dimension.
    pub fn step_size(&self) -> [f64; 2] {
        if self.model.variant.encodes_step() {
            let row = self.model.degree + 1;
            [self.coefficients[(row, 0)], self.coefficients[(row, 1)]]
        } else if let Some(step) = self.step_override {
            step.size
        } else {
            [0.0, 0.0]
        }
    }

    /// Velocity at window-relative time `t`; the step applies in full from `step_at()` on.
    pub fn first_derivative(&self, t: f64) -> [f64; 2] {
        let mut v = [0.0; 2];
        for (dim, out) in v.iter_mut().enumerate() {
            for d in 1..=self.model.degree {
                *out += d as f64 * t.powi(d as i32 - 1) * self.coefficients[(d, dim)];
            }
        }
        if self.uses_step() && t >= self.step_at() {
            let size = self.step_size();
            v[0] += size[0];
            v[1] += size[1];
        }
        v
    }

    /// Acceleration at window-relative time `t`.
    ///
    /// The impulse of a velocity step is rendered as a unit-width pulse on
    /// `(step_at − 0.5, step_at + 0.5]`.
    pub fn second_derivative(&self, t: f64) -> [f64; 2] {
        let mut a = [0.0; 2];
        for (dim, out) in a.iter_mut().enumerate() {
            for d in 2..=self.model.degree {
                *out += (d * (d - 1)) as f64 * t.powi(d as i32 - 2) * self.coefficients[(d, dim)];
            }
        }
        if self.uses_step() {
            let step_at = self.step_at();
            if step_at - 0.5 < t && t <= step_at + 0.5 {
                let size = self.step_size();
                a[0] += size[0];
                a[1] += size[1];
            }
        }
        a
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn model(n: usize, variant: ModelVariant) -> Arc<LocalModel> {
        Arc::new(LocalModel::build(n, POLY_DEGREE, variant, FitTolerances::default()).unwrap())
    }

    #[test]
    fn design_columns_follow_basis() {
        let m = model(7, ModelVariant::UnknownStep);
        assert_eq!((m.design().nrows(), m.design().ncols()), (7, 5));
        assert_eq!((m.pseudo_inverse().nrows(), m.pseudo_inverse().ncols()), (5, 7));
        assert_eq!(m.step_at(), 4.0);
        assert_eq!(m.design()[(3, 2)], 9.0);
        assert_eq!(m.design()[(6, 3)], 2.0);
        assert_eq!(m.design()[(3, 4)], 0.0);
        assert_eq!(m.design()[(4, 4)], 1.0);
    }

    #[test]
    fn illegal_known_step_is_rejected() {
        let tol = FitTolerances::default();
        for step_at in [0.0, 6.0, -1.0, f64::NAN] {
            let res = LocalModel::build(7, POLY_DEGREE, ModelVariant::KnownStep { step_at }, tol);
            assert!(matches!(res, Err(ModelError::IllegalStep { .. })));
        }
    }

    #[test]
    fn short_window_cannot_hold_unknown_step() {
        let res = LocalModel::build(3, POLY_DEGREE, ModelVariant::UnknownStep, FitTolerances::default());
        assert!(matches!(res, Err(ModelError::RankDeficient { cols: 5, .. })));
    }

    #[test]
    fn plain_fit_reproduces_quadratic() {
        let m = model(7, ModelVariant::Plain);
        let x: Vec<f64> = (0..10).map(|t| 1.0 + 2.0 * t as f64 + 0.5 * (t * t) as f64).collect();
        let y: Vec<f64> = (0..10).map(|t| -3.0 * t as f64).collect();
        let fit = m.fit(&x, &y, 2, 1).unwrap();
        assert_abs_diff_eq!(fit.error(), 0.0, epsilon = 1e-18);
        assert!(!fit.uses_step());
        assert!(fit.step_at().is_nan());
        assert_eq!(fit.step_size(), [0.0, 0.0]);
        // window-relative t = 3 is sample 5
        let v = fit.first_derivative(3.0);
        assert_abs_diff_eq!(v[0], 2.0 + 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v[1], -3.0, epsilon = 1e-9);
        let a = fit.second_derivative(3.0);
        assert_abs_diff_eq!(a[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(a[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn fit_rejects_missing_or_out_of_range_samples() {
        let m = model(5, ModelVariant::Plain);
        let mut x = vec![0.0; 8];
        let y = vec![0.0; 8];
        assert!(m.fit(&x, &y, -1, 1).is_none());
        assert!(m.fit(&x, &y, 4, 1).is_none());
        assert!(m.fit(&x, &y, 0, 2).is_none());
        assert!(m.fit(&x, &y, 3, 1).is_some());
        x[5] = f64::NAN;
        assert!(m.fit(&x, &y, 3, 1).is_none());
    }

    #[test]
    fn known_step_fit_is_exact_on_kink() {
        let m = model(7, ModelVariant::KnownStep { step_at: 3.4 });
        let x: Vec<f64> = (0..7).map(|t| t as f64).collect();
        let y: Vec<f64> = (0..7).map(|t| 2.0 * (t as f64 - 3.4).max(0.0)).collect();
        let fit = m.fit(&x, &y, 0, 1).unwrap();
        assert_abs_diff_eq!(fit.error(), 0.0, epsilon = 1e-18);
        assert_abs_diff_eq!(fit.step_size()[1], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.first_derivative(3.0)[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.first_derivative(4.0)[1], 2.0, epsilon = 1e-9);
        // pulse covers (2.9, 3.9]
        assert_abs_diff_eq!(fit.second_derivative(3.0)[1], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.second_derivative(4.0)[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.second_derivative(2.0)[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn unknown_step_locates_kink() {
        let m = model(7, ModelVariant::UnknownStep);
        let x: Vec<f64> = (0..7).map(|t| 0.5 * t as f64).collect();
        let y: Vec<f64> = (0..7).map(|t| 2.0 * (t as f64 - 3.4).max(0.0)).collect();
        let fit = m.fit(&x, &y, 0, 1).unwrap();
        assert!(matches!(fit.model().variant(), ModelVariant::KnownStep { .. }));
        assert_abs_diff_eq!(fit.step_at(), 3.4, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.step_size()[1], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.error(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn unknown_step_without_any_step_term_reports_zero() {
        let m = model(7, ModelVariant::UnknownStep);
        let zeros = vec![0.0; 7];
        let fit = m.fit(&zeros, &zeros, 0, 1).unwrap();
        assert_eq!(fit.model().variant(), ModelVariant::UnknownStep);
        assert_eq!(fit.step_at(), 0.0);
    }

    #[test]
    fn pre_subtracted_step_matches_known_step_model() {
        let plain = model(7, ModelVariant::Plain);
        let x: Vec<f64> = (0..9).map(|t| 0.1 * (t * t) as f64).collect();
        let y: Vec<f64> = (0..9).map(|t| 1.0 - 1.5 * (t as f64 - 4.25).max(0.0)).collect();
        // window starts at sample 1, so the kink sits at 3.25
        let fit = plain.fit_with_step(&x, &y, 1, 1, 3.25, [0.0, -1.5]).unwrap();
        assert!(fit.uses_step());
        assert_eq!(fit.step_at(), 3.25);
        assert_eq!(fit.step_size(), [0.0, -1.5]);
        assert_abs_diff_eq!(fit.error(), 0.0, epsilon = 1e-18);
        assert_abs_diff_eq!(fit.first_derivative(3.0)[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.first_derivative(4.0)[1], -1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.first_derivative(4.0)[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.second_derivative(3.0)[1], -1.5, epsilon = 1e-9);
    }

    #[test]
    #[should_panic(expected = "pre-subtracted step fit")]
    fn pre_subtracted_step_on_step_model_panics() {
        let m = model(7, ModelVariant::KnownStep { step_at: 3.0 });
        let zeros = vec![0.0; 7];
        let _ = m.fit_with_step(&zeros, &zeros, 0, 1, 3.0, [1.0, 1.0]);
    }

    #[test]
    fn strided_window_addresses_every_other_sample() {
        let m = model(5, ModelVariant::Plain);
        let x: Vec<f64> = (0..12).map(|t| t as f64).collect();
        let y: Vec<f64> = (0..12).map(|t| (t * t) as f64).collect();
        let fit = m.fit(&x, &y, 1, 2).unwrap();
        // per window step (2 samples): dx = 2, and at sample 5 (t = 2) dy = 2·5·2
        let v = fit.first_derivative(2.0);
        assert_abs_diff_eq!(v[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v[1], 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.second_derivative(2.0)[1], 8.0, epsilon = 1e-9);
    }
}
