//! AeroView Simulator CLI
//!
//! Run the viewer core headless through deterministic scenarios.

use aeroview_core::ViewerConfig;
use aeroview_sim::scenarios::ScenarioId;
use aeroview_sim::{ScenarioResult, ScenarioRunner};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Export every 10th frame (6 FPS at the default frame rate)
const EXPORT_EVERY: u64 = 10;

/// AeroView deterministic viewer simulation CLI
#[derive(Parser, Debug)]
#[command(name = "aeroview-sim")]
#[command(about = "Run the AeroView viewer core against a scripted simulator", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (hover, circuit, link_loss, offline, jitter, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Virtual duration in seconds
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Viewer configuration JSON (defaults to the built-in quadcopter)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export sampled frames to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Stream to a Rerun viewer (needs the `visualization` feature)
    #[arg(long)]
    visualize: bool,
}

/// Folds the seconds and sub-second nanos of an epoch offset into one seed.
fn seed_from_epoch(since_epoch: Duration) -> u64 {
    since_epoch.as_secs() ^ u64::from(since_epoch.subsec_nanos())
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("AeroView Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: hover, circuit, link_loss, offline, jitter, all");
            std::process::exit(1);
        })]
    };

    if args.export.is_some() && scenarios.len() > 1 {
        eprintln!("Error: --export only supports a single scenario, not 'all'");
        std::process::exit(1);
    }

    let config = args.config.as_deref().map(|path| {
        ViewerConfig::from_path(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        })
    });

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(1, seed_from_epoch)
    } else {
        args.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let mut runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_visualization(args.visualize);
        if let Some(config) = &config {
            runner = runner.with_config(config.clone());
        }
        if args.export.is_some() {
            runner = runner.with_export(EXPORT_EVERY);
        }

        for scenario in &scenarios {
            let mut result = runner.run(*scenario);

            if let (Some(path), Some(export)) = (&args.export, result.export.take()) {
                match export.write_to_file(path) {
                    Ok(()) => info!("Exported {} frames to {}", export.frames.len(), path),
                    Err(e) => error!("Failed to write export: {:?}", e),
                }
            }

            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED | frames={} polls={} max_error={:.3}m",
                        scenario.name(),
                        seed,
                        result.total_frames,
                        result.metrics.polls,
                        result.metrics.max_error
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "frames": r.total_frames,
                    "time_secs": r.final_time_secs,
                    "polls": r.metrics.polls,
                    "misses": r.metrics.misses,
                    "max_error_m": r.metrics.max_error,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
