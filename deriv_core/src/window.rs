//! Window placement around an evaluation point.
//!
//! A window of `n` samples spaced `stride` apart addresses
//! `center + stride·(k − c_at)` for `k = 0..n-1`. By default the evaluation
//! point sits at `c_at = n / 2`. If that window touches a missing or
//! out-of-range sample, the window slides along the trajectory (the
//! evaluation point moves toward one end of it) by the smaller amount that
//! clears every bad sample, preferring to slide toward later samples on a tie.

use serde::{Deserialize, Serialize};

/// Where one window sits in the trajectory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPlacement {
    /// Sample index of window position 0
    pub first: usize,
    /// Window position of the evaluation point
    pub c_at: usize,
}

impl WindowPlacement {
    /// Sample index of window position `k`.
    pub fn sample(&self, k: usize, stride: usize) -> usize {
        self.first + stride * k
    }

    /// Absolute (fractional) sample time of window-relative time `t`.
    pub fn absolute_time(&self, t: f64, stride: usize) -> f64 {
        self.first as f64 + stride as f64 * t
    }

    /// Window-relative time of absolute sample time `abs`.
    pub fn relative_time(&self, abs: f64, stride: usize) -> f64 {
        (abs - self.first as f64) / stride as f64
    }

    /// True if `abs` lies strictly between the first and last window sample.
    pub fn interior_contains(&self, abs: f64, stride: usize, window_len: usize) -> bool {
        let t = self.relative_time(abs, stride);
        t > 0.0 && t < (window_len - 1) as f64
    }
}

/// Place a window of `window_len` samples around sample `center`.
///
/// `x`/`y` must already carry NaN at every unusable sample. Returns `None`
/// when no placement within reach is fully valid.
pub fn place_window(
    x: &[f64],
    y: &[f64],
    center: usize,
    stride: usize,
    window_len: usize,
) -> Option<WindowPlacement> {
    let usable = |k: usize, c_at: usize| -> bool {
        let idx = center as isize + stride as isize * (k as isize - c_at as isize);
        usize::try_from(idx)
            .ok()
            .and_then(|i| Some((*x.get(i)?, *y.get(i)?)))
            .is_some_and(|(px, py)| !px.is_nan() && !py.is_nan())
    };

    let default_at = window_len / 2;
    let Some(highest_bad) = (0..window_len).rev().find(|&k| !usable(k, default_at)) else {
        return Some(WindowPlacement {
            first: center - stride * default_at,
            c_at: default_at,
        });
    };
    let lowest_bad = (0..window_len)
        .find(|&k| !usable(k, default_at))
        .unwrap_or(highest_bad);

    let move_up = highest_bad + 1;
    let move_down = window_len - lowest_bad;
    let c_at = if move_up <= move_down {
        default_at.checked_sub(move_up)?
    } else {
        default_at + move_down
    };
    if c_at >= window_len || stride * c_at > center {
        return None;
    }
    if !(0..window_len).all(|k| usable(k, c_at)) {
        return None;
    }

    tracing::trace!(center, c_at, default_at, "window shifted");
    Some(WindowPlacement {
        first: center - stride * c_at,
        c_at,
    })
}
