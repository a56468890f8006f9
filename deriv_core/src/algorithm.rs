//! Common interface of the derivative algorithms.

use crate::{
    error::ParamsError,
    estimator::DerivativeEstimator,
    finite_diff::FiniteDifference,
    types::{DerivativeParams, Derivatives, Trajectory},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Trait for an algorithm turning positions into velocities and accelerations.
pub trait DerivativeAlgorithm {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Derivatives at the points addressed by `params`, NaN everywhere else.
    fn differentiate(
        &self,
        trajectory: &Trajectory,
        params: &DerivativeParams,
    ) -> Result<Derivatives, ParamsError>;
}

/// Selectable algorithms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Local quadratic fits with velocity-step detection
    #[default]
    Bounce,
    /// Symmetric finite differences
    FiniteDifference,
}

impl AlgorithmKind {
    pub fn build(self) -> Box<dyn DerivativeAlgorithm + Send + Sync> {
        match self {
            AlgorithmKind::Bounce => Box::new(DerivativeEstimator::default()),
            AlgorithmKind::FiniteDifference => Box::new(FiniteDifference),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::Bounce => write!(f, "bounce"),
            AlgorithmKind::FiniteDifference => write!(f, "finite-difference"),
        }
    }
}

impl FromStr for AlgorithmKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bounce" => Ok(AlgorithmKind::Bounce),
            "finite-difference" | "fd" => Ok(AlgorithmKind::FiniteDifference),
            other => Err(format!(
                "unknown algorithm '{other}' (expected 'bounce' or 'finite-difference')"
            )),
        }
    }
}
