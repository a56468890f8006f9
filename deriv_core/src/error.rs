//! Error types.
//!
//! Missing or noisy samples are never errors: they surface as NaN outputs.
//! Only caller contract violations end up here.

use thiserror::Error;

/// Invalid per-call parameters or mismatched input arrays.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("stride must be at least 1")]
    StrideZero,

    #[error("spill {spill} is too small: the step model needs spill >= {min_spill}")]
    WindowTooShort { spill: usize, min_spill: usize },

    #[error("input length mismatch: x={x}, y={y}, valid={valid}")]
    LengthMismatch { x: usize, y: usize, valid: usize },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A local model could not be constructed for the requested shape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("design matrix {rows}x{cols} is rank deficient (rank {rank})")]
    RankDeficient { rows: usize, cols: usize, rank: usize },

    #[error("step at {step_at} is not strictly inside a window of length {window_len}")]
    IllegalStep { step_at: f64, window_len: usize },

    #[error("pseudo-inverse failed: {0}")]
    PseudoInverse(&'static str),
}
