//! Thin driver binary: load a validated `SimulationConfig` from a JSON
//! file, run every repeat, and print the output streams of spec.md §6.
//! Parsing an arbitrary text config format, creating output directories,
//! and full CLI argument handling remain external collaborators -- this
//! binary just exercises the core with one JSON path from argv.

use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use rdme_hybrid::config::SimulationConfig;
use rdme_hybrid::output::RunSummary;

fn wall_clock_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

fn main() -> ExitCode {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: rdme-run <config.json>");
        return ExitCode::FAILURE;
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: could not read '{path}': {e}");
            return ExitCode::FAILURE;
        }
    };
    let config: SimulationConfig = match serde_json::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: malformed configuration in '{path}': {e}");
            return ExitCode::FAILURE;
        }
    };
    let seed = config.simulation_control.seed.unwrap_or(0);

    let start = wall_clock_secs();
    match rdme_hybrid::run_from_config(config, &path) {
        Ok(outputs) => {
            for realization in &outputs {
                match serde_json::to_string(realization) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("error: could not serialize realization {}: {e}", realization.realization_index);
                        return ExitCode::FAILURE;
                    }
                }
            }
            let summary = RunSummary::from_outputs(&outputs, &path, seed, start, wall_clock_secs());
            match serde_json::to_string(&summary) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("error: could not serialize run summary: {e}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
