use approx::{assert_abs_diff_eq, assert_relative_eq};
use deriv_core::{
    DerivativeEstimator, DerivativeParams, EstimatorOutput, FitTolerances, ModelCache, StepDecision,
    Trajectory,
};

fn run(traj: &Trajectory, params: &DerivativeParams) -> EstimatorOutput {
    DerivativeEstimator::default()
        .evaluate(traj, params)
        .expect("valid parameters")
}

/// x = 0.5t² − 3t + 1, y = −0.25t² + t
fn parabola(len: usize) -> Trajectory {
    let points: Vec<(f64, f64)> = (0..len)
        .map(|t| {
            let t = t as f64;
            (0.5 * t * t - 3.0 * t + 1.0, -0.25 * t * t + t)
        })
        .collect();
    Trajectory::from_points(&points)
}

/// Ball dropped from `height`, bouncing with restitution `e`, drifting in x.
/// Returns the trajectory, true y velocity per sample, and bounce times.
fn bouncing_ball(len: usize, height: f64, g: f64, e: f64) -> (Trajectory, Vec<f64>, Vec<f64>) {
    const SUB: usize = 100;
    let h = 1.0 / SUB as f64;
    let (mut y, mut v) = (height, 0.0);
    let mut points = Vec::with_capacity(len);
    let mut vel = Vec::with_capacity(len);
    let mut bounces = Vec::new();
    for t in 0..len {
        points.push((0.3 * t as f64, y));
        vel.push(v);
        for s in 0..SUB {
            y += v * h + 0.5 * g * h * h;
            v += g * h;
            if y < 0.0 {
                y = -y;
                v = -v * e;
                bounces.push(t as f64 + (s + 1) as f64 * h);
            }
        }
    }
    (Trajectory::from_points(&points), vel, bounces)
}

/// Deterministic sample-to-sample jitter of amplitude `a`.
fn jitter(t: usize, a: f64) -> (f64, f64) {
    let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
    (
        a * (((t * 7) % 5) as f64 - 2.0) / 2.0,
        a * sign * ((t % 3) + 1) as f64 / 3.0,
    )
}

fn significant_steps(out: &EstimatorOutput) -> Vec<f64> {
    out.accepted_steps()
        .filter(|s| s.size[0].abs().max(s.size[1].abs()) > 1e-6)
        .map(|s| s.time)
        .collect()
}

#[test]
fn smooth_trajectory_reproduces_analytic_derivatives() {
    let traj = parabola(40);
    let out = run(&traj, &DerivativeParams::every_sample(3));
    let d = &out.derivatives;
    for i in 0..traj.len() {
        let t = i as f64;
        assert_relative_eq!(d.x_vel[i], t - 3.0, epsilon = 1e-8, max_relative = 1e-9);
        assert_relative_eq!(d.y_vel[i], -0.5 * t + 1.0, epsilon = 1e-8, max_relative = 1e-9);
        assert_relative_eq!(d.x_acc[i], 1.0, epsilon = 1e-8, max_relative = 1e-9);
        assert_relative_eq!(d.y_acc[i], -0.5, epsilon = 1e-8, max_relative = 1e-9);
    }
    assert!(significant_steps(&out).is_empty());
}

#[test]
fn invalid_samples_never_feed_a_fit() {
    let (mut traj, _, _) = bouncing_ball(60, 15.0, -0.2, 0.7);
    for i in [0, 9, 10, 31, 45] {
        traj.valid[i] = false;
    }
    traj.y[52] = f64::NAN;
    let out = run(&traj, &DerivativeParams::every_sample(3));

    for i in [0, 9, 10, 31, 45, 52] {
        assert!(!out.derivatives.is_estimated(i), "sample {i} should be NaN");
    }
    for (c, window) in out.debug.windows.iter().enumerate() {
        let Some(window) = window else {
            assert!(!out.derivatives.is_estimated(c));
            continue;
        };
        for k in 0..7 {
            let s = window.placement.sample(k, 1);
            assert!(traj.valid[s] && !traj.y[s].is_nan(), "window of {c} uses sample {s}");
        }
        assert!(out.derivatives.is_estimated(c));
    }
    // a single gap is sidestepped on either side
    assert!(out.derivatives.is_estimated(30));
    assert!(out.derivatives.is_estimated(32));
}

#[test]
fn window_shifts_at_trajectory_ends() {
    let traj = parabola(30);
    let out = run(&traj, &DerivativeParams::every_sample(3));
    for i in [0, 1, 2, 27, 28, 29] {
        assert!(out.derivatives.is_estimated(i));
        assert_abs_diff_eq!(out.derivatives.x_vel[i], i as f64 - 3.0, epsilon = 1e-8);
    }
    let first = out.debug.windows[0].as_ref().unwrap().placement;
    let last = out.debug.windows[29].as_ref().unwrap().placement;
    assert_eq!((first.first, first.c_at), (0, 0));
    assert_eq!((last.first, last.c_at), (23, 6));
}

#[test]
fn strided_subset_is_evaluated_in_step_units() {
    let traj = parabola(41);
    let params = DerivativeParams {
        spill: 2,
        start: 1,
        stride: 2,
        count: 100,
    };
    let out = run(&traj, &params);
    let d = &out.derivatives;
    for i in 0..traj.len() {
        if i % 2 == 0 {
            assert!(!d.is_estimated(i));
            continue;
        }
        let t = i as f64;
        // d/dstep = 2 · d/dt, d²/dstep² = 4 · d²/dt²
        assert_abs_diff_eq!(d.x_vel[i], 2.0 * (t - 3.0), epsilon = 1e-8);
        assert_abs_diff_eq!(d.y_acc[i], 4.0 * -0.5, epsilon = 1e-8);
    }
}

#[test]
fn strided_kink_is_found_on_the_stride_grid() {
    let v = 2.0;
    let points: Vec<(f64, f64)> = (0..80)
        .map(|t| (t as f64, v * (t as f64 - 41.0).max(0.0)))
        .collect();
    let params = DerivativeParams {
        spill: 3,
        start: 1,
        stride: 2,
        count: usize::MAX,
    };
    let out = run(&Trajectory::from_points(&points), &params);
    let d = &out.derivatives;

    let steps = significant_steps(&out);
    assert_eq!(steps.len(), 1);
    assert_abs_diff_eq!(steps[0], 41.0, epsilon = 1e-6);

    // per step of 2 samples: velocity jumps by 2·v, the pulse carries it
    for i in 0..80 {
        if i % 2 == 0 {
            assert!(!d.is_estimated(i), "sample {i} is off the stride grid");
            continue;
        }
        assert!(d.is_estimated(i));
        assert_abs_diff_eq!(d.x_vel[i], 2.0, epsilon = 1e-8);
        if i < 41 {
            assert_abs_diff_eq!(d.y_vel[i], 0.0, epsilon = 1e-8);
        } else if i > 41 {
            assert_abs_diff_eq!(d.y_vel[i], 2.0 * v, epsilon = 1e-8);
        }
        let expected_acc = if i == 41 { 2.0 * v } else { 0.0 };
        assert_abs_diff_eq!(d.y_acc[i], expected_acc, epsilon = 1e-8);
    }
}

#[test]
fn kink_is_localized_to_one_sample() {
    let v = -3.0;
    let points: Vec<(f64, f64)> = (0..40)
        .map(|t| (t as f64, v * (t as f64 - 20.0).max(0.0)))
        .collect();
    let out = run(&Trajectory::from_points(&points), &DerivativeParams::every_sample(3));
    let d = &out.derivatives;

    assert_eq!(significant_steps(&out).len(), 1);
    for i in 0..40 {
        assert_abs_diff_eq!(d.x_vel[i], 1.0, epsilon = 1e-8);
        if i < 20 {
            assert_abs_diff_eq!(d.y_vel[i], 0.0, epsilon = 1e-8);
        } else if i > 20 {
            assert_abs_diff_eq!(d.y_vel[i], v, epsilon = 1e-8);
        }
        let expected_acc = if i == 20 { v } else { 0.0 };
        assert_abs_diff_eq!(d.y_acc[i], expected_acc, epsilon = 1e-8);
    }
}

#[test]
fn bounces_are_found_and_velocity_tracks_truth() {
    let g = -0.2;
    let (traj, vel, bounces) = bouncing_ball(80, 20.0, g, 0.8);
    assert_eq!(bounces.len(), 4);
    let out = run(&traj, &DerivativeParams::every_sample(3));

    let steps = significant_steps(&out);
    assert_eq!(steps.len(), bounces.len());
    for b in &bounces {
        assert!(
            steps.iter().any(|s| (s - b).abs() < 0.05),
            "bounce at {b} not found in {steps:?}"
        );
    }

    let d = &out.derivatives;
    let pulse_samples: Vec<usize> = steps.iter().map(|s| s.round() as usize).collect();
    for i in 0..traj.len() {
        assert_abs_diff_eq!(d.y_vel[i], vel[i], epsilon = 1e-6);
        assert_abs_diff_eq!(d.x_vel[i], 0.3, epsilon = 1e-8);
        if pulse_samples.contains(&i) {
            assert!(d.y_acc[i] - g > 1.0, "no impulse at sample {i}");
        } else {
            assert_abs_diff_eq!(d.y_acc[i], g, epsilon = 1e-6);
        }
    }
}

#[test]
fn repeated_calls_are_bit_identical() {
    let (traj, _, _) = bouncing_ball(70, 12.0, -0.3, 0.75);
    let params = DerivativeParams::every_sample(4);
    let a = run(&traj, &params).derivatives;
    let b = run(&traj, &params).derivatives;
    for i in 0..traj.len() {
        for (p, q) in [
            (a.x_vel[i], b.x_vel[i]),
            (a.y_vel[i], b.y_vel[i]),
            (a.x_acc[i], b.x_acc[i]),
            (a.y_acc[i], b.y_acc[i]),
        ] {
            assert_eq!(p.to_bits(), q.to_bits());
        }
    }
}

#[test]
fn noise_level_kink_is_rejected() {
    let points: Vec<(f64, f64)> = (0..60)
        .map(|t| {
            let (jx, jy) = jitter(t, 0.05);
            let kink = 0.002 * (t as f64 - 30.0).max(0.0);
            (0.5 * t as f64 + jx, jy + kink)
        })
        .collect();
    let traj = Trajectory::from_points(&points);
    let out = run(&traj, &DerivativeParams::every_sample(3));

    assert_eq!(out.accepted_steps().count(), 0);
    assert!(out
        .debug
        .candidates
        .iter()
        .all(|c| c.decision == StepDecision::BelowThreshold));

    // around the kink the plain quadratic fit is what gets reported
    let models = ModelCache::new(7, FitTolerances::default()).unwrap();
    let (x, y) = traj.sanitized();
    for i in 27..=33 {
        let plain = models.plain().fit(&x, &y, i as isize - 3, 1).unwrap();
        let v = plain.first_derivative(3.0);
        let a = plain.second_derivative(3.0);
        assert_eq!(out.derivatives.velocity(i), (v[0], v[1]));
        assert_eq!(out.derivatives.acceleration(i), (a[0], a[1]));
    }
}

#[test]
fn overlapping_steps_do_not_share_windows() {
    // slope 0 → 3 at t = 20, 3 → −2 at t = 24: closer than one window (7)
    let points: Vec<(f64, f64)> = (0..60)
        .map(|t| {
            let t = t as f64;
            (t, 3.0 * (t - 20.0).max(0.0) - 5.0 * (t - 24.0).max(0.0))
        })
        .collect();
    let out = run(&Trajectory::from_points(&points), &DerivativeParams::every_sample(3));

    let accepted: Vec<_> = out
        .accepted_steps()
        .filter(|s| s.size[1].abs() > 1e-6)
        .collect();
    assert_eq!(accepted.len(), 2);
    let (late, early) = (accepted[0], accepted[1]);
    assert_abs_diff_eq!(late.time, 24.0, epsilon = 1e-6);
    assert_abs_diff_eq!(early.time, 20.0, epsilon = 1e-6);
    assert!(late.value > early.value);

    for c in &late.claimed {
        assert!(!early.claimed.contains(c));
    }
    for c in 22..=26 {
        assert!(late.claimed.contains(&c), "window {c} should belong to the stronger step");
    }
    for c in 18..=20 {
        assert!(early.claimed.contains(&c), "window {c} should belong to the weaker step");
    }
    for (c, window) in out.debug.windows.iter().enumerate() {
        let claims = [late, early]
            .iter()
            .filter(|s| s.claimed.contains(&c))
            .count();
        assert!(claims <= 1);
        if let Some(window) = window {
            if let Some(owner) = window.claimed_by {
                assert!(out.debug.candidates.iter().any(|s| s.eval_index == owner && s.accepted()));
            }
        }
    }
}
