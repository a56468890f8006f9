//! `bouncetrack` CLI: run scenarios, evaluate recorded trajectory logs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use deriv_core::{
    AlgorithmKind, DerivativeEstimator, DerivativeMetrics, DerivativeParams, Derivatives,
    StepCandidate,
};
use sim::replay::{load_log, save_log, TrajectoryLog};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "bouncetrack", about = "Velocity and acceleration from sampled positions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a named scenario, estimate its derivatives and report errors.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Window half-width
        #[arg(long, default_value_t = 3)]
        spill: usize,
        /// Samples between evaluated points
        #[arg(long, default_value_t = 1)]
        stride: usize,
        /// `bounce` or `finite-difference`
        #[arg(long, default_value = "bounce")]
        algorithm: AlgorithmKind,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the recorded trajectory
        #[arg(long)]
        save_log: Option<PathBuf>,
    },
    /// Estimate derivatives of a previously recorded trajectory log.
    Evaluate {
        /// Path to trajectory log JSON file
        input: PathBuf,
        /// `bounce` or `finite-difference`
        #[arg(long, default_value = "bounce")]
        algorithm: AlgorithmKind,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            spill,
            stride,
            algorithm,
            output,
            save_log: log_path,
        } => {
            let params = DerivativeParams {
                spill,
                stride,
                ..Default::default()
            };
            run_scenario(scenario, seed, params, algorithm, output.as_deref(), log_path.as_deref())?;
        }
        Commands::Evaluate {
            input,
            algorithm,
            output,
        } => {
            run_evaluate(&input, algorithm, output.as_deref())?;
        }
    }

    Ok(())
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    params: DerivativeParams,
    algorithm: AlgorithmKind,
    output_path: Option<&Path>,
    log_path: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    println!(
        "Recording scenario '{}' (seed={}, frames={})...",
        scenario.name, seed, scenario.frames
    );
    let log = TrajectoryLog::from_track(
        scenario.name.clone(),
        seed,
        scenario.frame_dt,
        params,
        scenario.record(),
    );
    if !log.events.is_empty() {
        println!("True events at frames: {}", format_times(&log.events));
    }

    let report = evaluate_log(&log, algorithm)?;

    if let Some(lpath) = log_path {
        save_log(&log, lpath)?;
        println!("Trajectory log saved to {}", lpath.display());
    }
    if let Some(opath) = output_path {
        write_report(&report, opath)?;
    }

    Ok(())
}

fn run_evaluate(input: &Path, algorithm: AlgorithmKind, output_path: Option<&Path>) -> Result<()> {
    let log = load_log(input)?;
    println!(
        "Evaluating '{}' ({} samples)...",
        log.name,
        log.trajectory.len()
    );

    let report = evaluate_log(&log, algorithm)?;

    if let Some(opath) = output_path {
        write_report(&report, opath)?;
    }

    Ok(())
}

/// Run `algorithm` over a log, print a summary and return the JSON report.
fn evaluate_log(log: &TrajectoryLog, algorithm: AlgorithmKind) -> Result<serde_json::Value> {
    let start = std::time::Instant::now();
    let (derivatives, steps) = differentiate(log, algorithm)?;
    let elapsed = start.elapsed();

    // estimator output is per step of `stride` samples
    let step_dt = log.frame_dt * log.params.stride as f64;
    let derivatives = derivatives.to_time_units(step_dt);

    let estimated = (0..derivatives.len())
        .filter(|&i| derivatives.is_estimated(i))
        .count();
    println!(
        "Done ({}): {} of {} points estimated, elapsed={:.3}ms",
        algorithm,
        estimated,
        derivatives.len(),
        elapsed.as_secs_f64() * 1e3,
    );
    if algorithm == AlgorithmKind::Bounce {
        let times: Vec<f64> = steps.iter().map(|s| s.time).collect();
        println!("Accepted steps at frames: {}", format_times(&times));
    }

    let mut report = serde_json::json!({
        "name": log.name,
        "seed": log.seed,
        "algorithm": algorithm,
        "elapsed_s": elapsed.as_secs_f64(),
        "estimated": estimated,
        "steps": steps,
    });

    if let Some(truth) = &log.truth {
        let mut metrics = DerivativeMetrics::default();
        metrics.accumulate(&derivatives, truth);
        println!(
            "Velocity RMSE={:.4}, acceleration RMSE={:.4}, coverage={:.1}%",
            metrics.rmse_velocity(),
            metrics.rmse_acceleration(),
            metrics.coverage() * 100.0,
        );
        report["metrics"] = serde_json::to_value(&metrics)?;
    }

    Ok(report)
}

fn differentiate(
    log: &TrajectoryLog,
    algorithm: AlgorithmKind,
) -> Result<(Derivatives, Vec<StepCandidate>)> {
    match algorithm {
        AlgorithmKind::Bounce => {
            let out = DerivativeEstimator::default().evaluate(&log.trajectory, &log.params)?;
            tracing::debug!(total_us = out.total_time_us, "estimator finished");
            let steps = out.accepted_steps().cloned().collect();
            Ok((out.derivatives, steps))
        }
        other => {
            let derivatives = other.build().differentiate(&log.trajectory, &log.params)?;
            Ok((derivatives, Vec::new()))
        }
    }
}

fn write_report(report: &serde_json::Value, path: &Path) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    println!("Metrics saved to {}", path.display());
    Ok(())
}

fn format_times(times: &[f64]) -> String {
    if times.is_empty() {
        return "none".into();
    }
    times
        .iter()
        .map(|t| format!("{t:.2}"))
        .collect::<Vec<_>>()
        .join(", ")
}
