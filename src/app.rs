//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and initialises logging
//! - parses CLI arguments
//! - runs the requested subcommand through `pipeline`
//! - prints reports and writes optional exports

use clap::Parser;

use crate::cli::{Command, FitArgs, ListArgs, SimulateArgs};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `wdfit` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::List(args) => handle_list(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let run = pipeline::run_fit(&args)?;

    println!("{}", crate::report::format_fit_summary(&run.request, &run.results));

    if let Some(path) = &args.export {
        crate::io::export::write_results_json(path, &run.request, &run.results)?;
    }
    if let Some(path) = &args.export_chain {
        let best = run
            .results
            .best()
            .ok_or_else(|| AppError::new(4, "No converged family to export a chain for."))?;
        crate::io::export::write_chain_csv(path, best)?;
    }

    if run.results.best().is_none() {
        return Err(AppError::new(4, "No atmosphere family converged."));
    }
    Ok(())
}

fn handle_list(args: ListArgs) -> Result<(), AppError> {
    let data = pipeline::load_data(&args.data, &args.atmospheres)?;
    for &family in &args.atmospheres {
        let columns = data.grid.table(family)?.parameters();
        println!("{}", crate::report::format_parameters(family, &columns));
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let out = pipeline::run_simulate(&args)?;
    for path in &out.files {
        println!("wrote {}", path.display());
    }
    let observed = out.observations.iter().filter(|o| o.photometry.is_some()).count();
    println!(
        "{} star: Mbol={} logg={} d={} pc, {observed} of {} band(s) observed",
        args.family,
        args.mbol,
        args.logg,
        args.distance,
        out.observations.len()
    );
    Ok(())
}
