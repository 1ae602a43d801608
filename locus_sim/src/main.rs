//! Locus simulation harness CLI
//!
//! Loads canned or file-based scenes into a space, steps them and checks
//! the housing, collision and lifecycle guarantees.

use clap::Parser;
use locus_sim::runner::load_scene;
use locus_sim::scenarios::ScenarioId;
use locus_sim::{ScenarioResult, ScenarioRunner, SimConfig, SimExport};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Locus deterministic simulation harness
#[derive(Parser, Debug)]
#[command(name = "locus-sim")]
#[command(about = "Run placement and stepping scenarios against the Locus space", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (dense_swarm, grid_fleet, overcrowded, mixed_engines, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Run a JSON scene file instead of the canned scenarios
    #[arg(long, conflicts_with = "scenario")]
    scene: Option<String>,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Steps to run after loading each scene
    #[arg(short, long, default_value = "200")]
    ticks: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frames of a single run to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    if !args.json {
        info!("Locus simulation harness v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Scenes to run, by name
    let scenes: Vec<(String, locus_sim::SceneFile)> = if let Some(path) = &args.scene {
        match load_scene(path) {
            Ok(scene) => vec![(path.clone(), scene)],
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(2);
            }
        }
    } else if args.scenario == "all" {
        ScenarioId::all()
            .into_iter()
            .map(|s| (s.name().to_string(), s.scene()))
            .collect()
    } else {
        match args.scenario.parse::<ScenarioId>() {
            Ok(s) => vec![(s.name().to_string(), s.scene())],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: dense_swarm, grid_fleet, overcrowded, mixed_engines, all");
                std::process::exit(2);
            }
        }
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let config = SimConfig {
        seed: base_seed,
        ticks: args.ticks,
        ..SimConfig::default()
    };

    if let Some(export_path) = &args.export {
        if scenes.len() > 1 || args.seeds > 1 {
            eprintln!("Error: --export only supports a single scenario and seed, not 'all'");
            std::process::exit(2);
        }
        let (name, scene) = &scenes[0];
        let mut export = SimExport::new(name, base_seed);
        let result = ScenarioRunner::new(config).run_with_export(name, scene, &mut export);

        match export.write_to_file(export_path) {
            Ok(()) => info!("Exported {} frames to {}", export.frames.len(), export_path),
            Err(e) => error!("Failed to write export: {}", e),
        }
        report(&result, args.json);
        if !result.passed {
            std::process::exit(1);
        }
        return;
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let runner = ScenarioRunner::new(config).with_seed(base_seed.wrapping_add(seed_offset as u64));
        for (name, scene) in &scenes {
            let result = runner.run_scene(name, scene, None);
            if !args.json {
                report(&result, false);
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize summary: {}", e),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

fn report(result: &ScenarioResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize result: {}", e),
        }
    } else if result.passed {
        info!("✓ {} (seed={}) PASSED", result.scenario, result.seed);
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario,
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}
