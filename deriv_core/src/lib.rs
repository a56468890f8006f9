//! `deriv_core` — Bounce-aware derivative estimation for sampled 2-D trajectories.
//!
//! # Module layout
//! - [`types`]       — Trajectory, per-call parameters, derivative arrays
//! - [`error`]       — Parameter and model construction errors
//! - [`model`]       — Local polynomial models (plain / known step / unknown step) and fits
//! - [`window`]      — Window placement around an evaluation point
//! - [`estimator`]   — Sliding-window scan, step evidence, greedy assignment, extraction
//! - [`finite_diff`] — Symmetric finite-difference baseline
//! - [`algorithm`]   — `DerivativeAlgorithm` trait shared by both estimators
//! - [`metrics`]     — RMSE of velocity / acceleration against ground truth

pub mod algorithm;
pub mod error;
pub mod estimator;
pub mod finite_diff;
pub mod metrics;
pub mod model;
pub mod types;
pub mod window;

pub use algorithm::{AlgorithmKind, DerivativeAlgorithm};
pub use error::{ModelError, ParamsError};
pub use estimator::{
    evaluate, DerivativeEstimator, EstimatorConfig, EstimatorDebugData, EstimatorOutput,
    StepCandidate, StepDecision,
};
pub use finite_diff::FiniteDifference;
pub use metrics::DerivativeMetrics;
pub use model::{FitResult, FitTolerances, LocalModel, ModelCache, ModelVariant};
pub use types::{DerivativeParams, Derivatives, Trajectory, POLY_DEGREE};
pub use window::WindowPlacement;
