//! Bounce-aware derivative estimator.
//!
//! # Phases per call
//! 1. Place a window around every evaluation point; fit a plain and an
//!    unknown-step model to it (parallel over evaluation points)
//! 2. Score every step candidate: each window near the candidate votes with
//!    the residual reduction the step would give it (parallel)
//! 3. Accept candidates greedily by descending score; an accepted step claims
//!    every still-unclaimed window whose interior contains it
//! 4. Read velocity and acceleration off the assigned (or plain) fit
//!
//! Models are built once per call through [`ModelCache`]; only the
//! known-step refits depend on the data.

use crate::{
    algorithm::DerivativeAlgorithm,
    error::ParamsError,
    model::{FitResult, FitTolerances, ModelCache},
    types::{DerivativeParams, Derivatives, Trajectory, POLY_DEGREE},
    window::{place_window, WindowPlacement},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{ops::Range, time::Instant};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for the bounce-aware estimator.
#[derive(Clone, Debug)]
pub struct EstimatorConfig {
    /// A step is rejected if its score is below
    /// `accept_ratio · window_len · (plain fit error of its own window)`.
    pub accept_ratio: f64,
    /// Rank and clamping tolerances for model construction
    pub tolerances: FitTolerances,
    /// Run the fitting and scoring phases on the rayon pool
    pub parallel: bool,
    /// Populate [`EstimatorDebugData`]
    pub collect_debug: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            accept_ratio: 0.6,
            tolerances: FitTolerances::default(),
            parallel: true,
            collect_debug: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Debug data
// ---------------------------------------------------------------------------

/// Why a step candidate was or was not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepDecision {
    /// Accepted; claimed at least its own window
    Accepted,
    /// Score not positive, or below the acceptance threshold
    BelowThreshold,
    /// Its window was already claimed by a stronger step
    WindowClaimed,
}

/// One step candidate, in the order candidates were considered.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepCandidate {
    /// Evaluation point whose window proposed the step
    pub eval_index: usize,
    /// Absolute (fractional) sample time of the step
    pub time: f64,
    /// Velocity jump per dimension (per step of `stride` samples)
    pub size: [f64; 2],
    /// Aggregated residual reduction over overlapping windows
    pub value: f64,
    /// Acceptance threshold for this candidate
    pub threshold: f64,
    pub decision: StepDecision,
    /// Evaluation points whose windows this step claimed
    pub claimed: Vec<usize>,
}

impl StepCandidate {
    pub fn accepted(&self) -> bool {
        self.decision == StepDecision::Accepted
    }
}

/// Per-evaluation-point diagnostics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WindowDebug {
    pub placement: WindowPlacement,
    pub poly_error: f64,
    pub step_error: f64,
    /// Window-relative step time of the unknown-step fit (0: none found)
    pub step_at: f64,
    pub value: f64,
    /// Evaluation point whose accepted step claimed this window
    pub claimed_by: Option<usize>,
}

/// Everything produced along the way, for inspection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EstimatorDebugData {
    /// Indexed by evaluation point; `None` where no window could be placed
    pub windows: Vec<Option<WindowDebug>>,
    pub candidates: Vec<StepCandidate>,
    /// Timings in microseconds
    pub timing_fit_us: u64,
    pub timing_score_us: u64,
    pub timing_assign_us: u64,
    pub timing_extract_us: u64,
}

/// Output of one evaluation.
#[derive(Clone, Debug)]
pub struct EstimatorOutput {
    pub derivatives: Derivatives,
    /// Populated only when `collect_debug` is true
    pub debug: EstimatorDebugData,
    pub total_time_us: u64,
}

impl EstimatorOutput {
    /// Accepted steps, strongest first.
    pub fn accepted_steps(&self) -> impl Iterator<Item = &StepCandidate> {
        self.debug.candidates.iter().filter(|c| c.accepted())
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

/// Plain and unknown-step fits of one placed window.
struct WindowFits {
    placement: WindowPlacement,
    poly: FitResult,
    step: FitResult,
}

impl WindowFits {
    /// Absolute time of the proposed step, if the step fit found one.
    fn step_time(&self, stride: usize) -> Option<f64> {
        let step_at = self.step.step_at();
        (step_at != 0.0 && step_at.is_finite())
            .then(|| self.placement.absolute_time(step_at, stride))
    }
}

/// Shared read-only state of one call.
struct Scan<'a> {
    x: &'a [f64],
    y: &'a [f64],
    start: usize,
    stride: usize,
    count: usize,
    window_len: usize,
    models: &'a ModelCache,
}

impl Scan<'_> {
    /// Evaluation points whose sample index lies in `[lo, hi]`.
    fn eval_range(&self, lo: f64, hi: f64) -> Range<usize> {
        let stride = self.stride as f64;
        let first = ((lo - self.start as f64) / stride).ceil().max(0.0);
        let last = ((hi - self.start as f64) / stride).floor();
        if last < first || last < 0.0 {
            return 0..0;
        }
        let first = first as usize;
        let end = (last as usize + 1).min(self.count);
        first.min(end)..end
    }

    fn fit_window(&self, c: usize) -> Option<WindowFits> {
        let center = self.start + self.stride * c;
        let placement = place_window(self.x, self.y, center, self.stride, self.window_len)?;
        let first = placement.first as isize;
        let poly = self.models.plain().fit(self.x, self.y, first, self.stride)?;
        let step = self.models.unknown_step().fit(self.x, self.y, first, self.stride)?;
        Some(WindowFits {
            placement,
            poly,
            step,
        })
    }

    /// Plain fit of `other`'s window with the step `(time, size)` subtracted.
    fn refit_with_step(&self, other: &WindowFits, time: f64, size: [f64; 2]) -> Option<FitResult> {
        if !other
            .placement
            .interior_contains(time, self.stride, self.window_len)
        {
            return None;
        }
        let tau = other.placement.relative_time(time, self.stride);
        self.models.plain().fit_with_step(
            self.x,
            self.y,
            other.placement.first as isize,
            self.stride,
            tau,
            size,
        )
    }

    /// Residual reduction the step proposed by window `c` gives every window
    /// centered within half a window of the step, window `c` included.
    fn score(&self, fits: &[Option<WindowFits>], c: usize) -> f64 {
        let Some(own) = &fits[c] else { return 0.0 };
        let Some(time) = own.step_time(self.stride) else {
            return 0.0;
        };
        let size = own.step.step_size();
        let half = 0.5 * (self.stride * (self.window_len - 1)) as f64;
        self.eval_range(time - half, time + half)
            .filter_map(|other| {
                let other = fits[other].as_ref()?;
                let refit = self.refit_with_step(other, time, size)?;
                Some(other.poly.error() - refit.error())
            })
            .sum()
    }
}

/// Bounce-aware estimator: local quadratic fits plus greedily assigned velocity steps.
#[derive(Clone, Debug, Default)]
pub struct DerivativeEstimator {
    pub config: EstimatorConfig,
}

impl DerivativeEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Check parameters against the trajectory without evaluating.
    pub fn validate(
        &self,
        trajectory: &Trajectory,
        params: &DerivativeParams,
    ) -> Result<(), ParamsError> {
        trajectory.check_lengths()?;
        if params.stride == 0 {
            return Err(ParamsError::StrideZero);
        }
        // the unknown-step basis has degree + 3 columns
        let min_spill = (POLY_DEGREE + 2) / 2;
        if params.spill < min_spill {
            return Err(ParamsError::WindowTooShort {
                spill: params.spill,
                min_spill,
            });
        }
        Ok(())
    }

    /// Estimate velocity and acceleration at every addressed evaluation point.
    pub fn evaluate(
        &self,
        trajectory: &Trajectory,
        params: &DerivativeParams,
    ) -> Result<EstimatorOutput, ParamsError> {
        self.validate(trajectory, params)?;
        let start_total = Instant::now();
        let len = trajectory.len();
        let mut derivatives = Derivatives::nan(len);
        let mut debug = EstimatorDebugData::default();
        let collect = self.config.collect_debug;

        let count = params.clamped_count(len);
        let window_len = params.window_len();
        // nothing to evaluate, or no window fits in the trajectory
        if count == 0 || window_len > len {
            return Ok(EstimatorOutput {
                derivatives,
                debug,
                total_time_us: start_total.elapsed().as_micros() as u64,
            });
        }

        let models = ModelCache::new(window_len, self.config.tolerances)?;
        let (x, y) = trajectory.sanitized();
        let scan = Scan {
            x: &x,
            y: &y,
            start: params.start,
            stride: params.stride,
            count,
            window_len,
            models: &models,
        };

        // ----------------------------------------------------------------
        // Phase 1: window placement, plain and unknown-step fits
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let fits: Vec<Option<WindowFits>> = if self.config.parallel {
            (0..count).into_par_iter().map(|c| scan.fit_window(c)).collect()
        } else {
            (0..count).map(|c| scan.fit_window(c)).collect()
        };
        debug.timing_fit_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Phase 2: step evidence
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let values: Vec<f64> = if self.config.parallel {
            (0..count).into_par_iter().map(|c| scan.score(&fits, c)).collect()
        } else {
            (0..count).map(|c| scan.score(&fits, c)).collect()
        };
        debug.timing_score_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Phase 3: greedy non-overlapping assignment
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let mut order: Vec<usize> = (0..count).collect();
        // stable: equal values keep ascending evaluation order
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

        let mut assigned: Vec<Option<FitResult>> = vec![None; count];
        let mut claimed_by: Vec<Option<usize>> = vec![None; count];
        let reach = (params.stride * (window_len - 1)) as f64;

        for c in order {
            let Some(own) = &fits[c] else { continue };
            let Some(time) = own.step_time(params.stride) else {
                continue;
            };
            let value = values[c];
            let threshold = self.config.accept_ratio * window_len as f64 * own.poly.error();
            let size = own.step.step_size();
            let mut candidate = StepCandidate {
                eval_index: c,
                time,
                size,
                value,
                threshold,
                decision: StepDecision::Accepted,
                claimed: Vec::new(),
            };

            if assigned[c].is_some() {
                candidate.decision = StepDecision::WindowClaimed;
            } else if value <= 0.0 || value < threshold {
                // no net residual reduction, or too little relative to its own window
                tracing::debug!(c, time, value, threshold, "step candidate rejected");
                candidate.decision = StepDecision::BelowThreshold;
            } else {
                for other_c in scan.eval_range(time - reach, time + reach) {
                    if assigned[other_c].is_some() {
                        continue;
                    }
                    let Some(other) = &fits[other_c] else { continue };
                    if let Some(refit) = scan.refit_with_step(other, time, size) {
                        assigned[other_c] = Some(refit);
                        claimed_by[other_c] = Some(c);
                        candidate.claimed.push(other_c);
                    }
                }
                tracing::debug!(
                    c,
                    time,
                    value,
                    threshold,
                    windows = candidate.claimed.len(),
                    "step accepted"
                );
            }

            if collect {
                debug.candidates.push(candidate);
            }
        }
        debug.timing_assign_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Phase 4: derivative extraction
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        for (c, window) in fits.iter().enumerate() {
            let Some(window) = window else { continue };
            let model = assigned[c].as_ref().unwrap_or(&window.poly);
            let t = window.placement.c_at as f64;
            derivatives.set(
                params.sample_index(c),
                model.first_derivative(t),
                model.second_derivative(t),
            );
        }
        debug.timing_extract_us = t0.elapsed().as_micros() as u64;

        if collect {
            debug.windows = fits
                .iter()
                .enumerate()
                .map(|(c, window)| {
                    window.as_ref().map(|w| WindowDebug {
                        placement: w.placement,
                        poly_error: w.poly.error(),
                        step_error: w.step.error(),
                        step_at: w.step.step_at(),
                        value: values[c],
                        claimed_by: claimed_by[c],
                    })
                })
                .collect();
        }

        let total_time_us = start_total.elapsed().as_micros() as u64;
        tracing::debug!(
            count,
            placed = fits.iter().filter(|f| f.is_some()).count(),
            steps = claimed_by.iter().flatten().count(),
            total_time_us,
            "derivatives evaluated"
        );

        Ok(EstimatorOutput {
            derivatives,
            debug,
            total_time_us,
        })
    }
}

impl DerivativeAlgorithm for DerivativeEstimator {
    fn name(&self) -> &'static str {
        "bounce"
    }

    fn differentiate(
        &self,
        trajectory: &Trajectory,
        params: &DerivativeParams,
    ) -> Result<Derivatives, ParamsError> {
        self.evaluate(trajectory, params).map(|out| out.derivatives)
    }
}

/// Estimate `(xVel, yVel, xAcc, yAcc)` with the default configuration.
pub fn evaluate(
    params: &DerivativeParams,
    x: &[f64],
    y: &[f64],
    valid: &[bool],
) -> Result<Derivatives, ParamsError> {
    let trajectory = Trajectory::new(x.to_vec(), y.to_vec(), valid.to_vec());
    let estimator = DerivativeEstimator::new(EstimatorConfig {
        collect_debug: false,
        ..Default::default()
    });
    estimator.differentiate(&trajectory, params)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
