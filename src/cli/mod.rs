//! Command-line parsing for the white dwarf photometric fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting code. Everything here maps one-to-one onto a [`FitRequest`] or a
//! data-source choice; validation happens in the library.
//!
//! [`FitRequest`]: crate::domain::FitRequest

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::{ExtinctionMode, Family, InterpolationMethod, LocalAlgorithm, Parameter};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "wdfit", version, about = "White dwarf photometric parameter fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit observed photometry against every requested atmosphere family.
    Fit(FitArgs),
    /// List the columns (axes, filters, quantities) of an atmosphere family.
    List(ListArgs),
    /// Write a synthetic atmosphere grid and photometry for one star as CSV.
    Simulate(SimulateArgs),
}

/// Where atmosphere tables come from.
///
/// Paths not given on the command line fall back to `WDFIT_ATMOSPHERE_H`,
/// `WDFIT_ATMOSPHERE_HE`, `WDFIT_PASSBANDS` and `WDFIT_FILTER_EXTINCTION`
/// (a `.env` file is honoured).
#[derive(Debug, Args, Clone, Default)]
pub struct DataArgs {
    /// H-rich atmosphere table CSV.
    #[arg(long = "atmosphere-h", value_name = "CSV")]
    pub atmosphere_h: Option<PathBuf>,

    /// He-rich atmosphere table CSV.
    #[arg(long = "atmosphere-he", value_name = "CSV")]
    pub atmosphere_he: Option<PathBuf>,

    /// Pivot wavelengths (`filter,wavelength`), needed for interpolated extinction.
    #[arg(long, value_name = "CSV")]
    pub passbands: Option<PathBuf>,

    /// Tabulated per-filter extinction (`filter,logg,teff,rv,value`).
    #[arg(long = "filter-extinction", value_name = "CSV")]
    pub filter_extinction: Option<PathBuf>,

    /// Use the built-in analytic grid instead of files.
    #[arg(long, conflicts_with_all = ["atmosphere_h", "atmosphere_he", "passbands"])]
    pub synthetic: bool,
}

/// Search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodKind {
    /// Local minimisation of chi-square.
    Minimize,
    /// Levenberg-Marquardt on the residual vector.
    LeastSquares,
    /// Affine-invariant ensemble sampling.
    Ensemble,
}

/// Options for `wdfit fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Observed photometry (`filter,mag,mag_err`; empty mag = not observed).
    #[arg(short = 'p', long, value_name = "CSV")]
    pub photometry: PathBuf,

    /// Free parameters, in order (exactly one of mbol/teff).
    #[arg(short = 'i', long, value_enum, value_delimiter = ',', default_value = "mbol")]
    pub independent: Vec<Parameter>,

    /// Initial guess for the free parameters (distance may be omitted).
    #[arg(short = 'g', long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub guess: Vec<f64>,

    /// Fixed surface gravity when logg is not free.
    #[arg(long, default_value_t = 8.0)]
    pub logg: f64,

    /// Fixed distance in pc. Omit to fit the distance.
    #[arg(short = 'd', long)]
    pub distance: Option<f64>,

    /// Uncertainty of the fixed distance in pc.
    #[arg(long, default_value_t = 0.0)]
    pub distance_err: f64,

    /// Atmosphere families to fit.
    #[arg(short = 'a', long = "atmosphere", value_enum, value_delimiter = ',', default_value = "h,he")]
    pub atmospheres: Vec<Family>,

    #[arg(long, value_enum, default_value_t = InterpolationMethod::GridSpline)]
    pub interpolation: InterpolationMethod,

    /// Rebuild interpolators instead of reusing cached ones.
    #[arg(long)]
    pub rebuild: bool,

    /// Reject photometry files with unobserved bands.
    #[arg(long)]
    pub strict: bool,

    #[arg(short = 'm', long, value_enum, default_value_t = MethodKind::Minimize)]
    pub method: MethodKind,

    /// Local minimisation algorithm.
    #[arg(long, value_enum, default_value_t = LocalAlgorithm::NelderMead)]
    pub algorithm: LocalAlgorithm,

    /// Iteration cap (minimize / least-squares).
    #[arg(long)]
    pub max_iters: Option<u64>,

    /// Convergence tolerance (minimize).
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Lower/upper bounds per parameter as `lo:hi`, comma separated (least squares and priors).
    #[arg(long, value_delimiter = ',', value_parser = parse_bound, allow_hyphen_values = true)]
    pub bounds: Vec<(f64, f64)>,

    #[arg(long, default_value_t = 32)]
    pub nwalkers: usize,

    #[arg(long, default_value_t = 1000)]
    pub nsteps: usize,

    #[arg(long, default_value_t = 500)]
    pub nburn: usize,

    /// Keep only samples inside these percentiles, e.g. `5:95`.
    #[arg(long, value_parser = parse_bound)]
    pub refine: Option<(f64, f64)>,

    /// Sampler seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Evaluate walkers on a single thread.
    #[arg(long)]
    pub serial: bool,

    /// Colour excess E(B-V); 0 disables reddening.
    #[arg(long, default_value_t = 0.0)]
    pub ebv: f64,

    #[arg(long, default_value_t = 3.1)]
    pub rv: f64,

    /// Extinction law: tabulated per filter, or interpolated at pivot wavelengths.
    #[arg(long, value_enum, default_value_t = ExtinctionMode::Filter)]
    pub extinction: ExtinctionMode,

    /// Write all results to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Write the preferred family's sample chain to CSV (ensemble only).
    #[arg(long = "export-chain", value_name = "CSV")]
    pub export_chain: Option<PathBuf>,
}

/// Options for `wdfit list`.
#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[arg(short = 'a', long = "atmosphere", value_enum, value_delimiter = ',', default_value = "h,he")]
    pub atmospheres: Vec<Family>,
}

/// Options for `wdfit simulate`.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Directory for `atmosphere_h.csv`, `atmosphere_he.csv`, `passbands.csv` and `photometry.csv`.
    #[arg(short = 'o', long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Family the simulated star belongs to.
    #[arg(short = 'a', long = "atmosphere", value_enum, default_value_t = Family::H)]
    pub family: Family,

    #[arg(long, default_value_t = 10.0)]
    pub mbol: f64,

    #[arg(long, default_value_t = 8.0)]
    pub logg: f64,

    /// Distance in pc.
    #[arg(short = 'd', long, default_value_t = 10.0)]
    pub distance: f64,

    /// Photometric error per band.
    #[arg(long, default_value_t = 0.05)]
    pub err: f64,

    /// Noise seed; omit for noise-free magnitudes.
    #[arg(long)]
    pub seed: Option<u64>,

    /// E(B-V) applied with the interpolated extinction law.
    #[arg(long, default_value_t = 0.0)]
    pub ebv: f64,

    #[arg(long, default_value_t = 3.1)]
    pub rv: f64,

    /// Bands reported as not observed.
    #[arg(long, value_delimiter = ',')]
    pub drop: Vec<String>,
}

fn parse_bound(raw: &str) -> Result<(f64, f64), String> {
    let (lo, hi) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `lo:hi`, got '{raw}'"))?;
    let lo = lo.trim().parse::<f64>().map_err(|e| format!("invalid lower bound '{lo}': {e}"))?;
    let hi = hi.trim().parse::<f64>().map_err(|e| format!("invalid upper bound '{hi}': {e}"))?;
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_defaults() {
        let cli = Cli::parse_from(["wdfit", "fit", "--synthetic", "-p", "phot.csv", "-g", "10"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert!(args.data.synthetic);
        assert_eq!(args.independent, vec![Parameter::Mbol]);
        assert_eq!(args.atmospheres, vec![Family::H, Family::He]);
        assert_eq!(args.method, MethodKind::Minimize);
        assert_eq!(args.distance, None);
    }

    #[test]
    fn lists_and_bounds_parse() {
        let cli = Cli::parse_from([
            "wdfit", "fit", "-p", "p.csv", "-i", "mbol,logg", "-g", "10,7.5", "--bounds", "0:20,7:9.5", "-m",
            "least-squares", "-a", "he",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.independent, vec![Parameter::Mbol, Parameter::Logg]);
        assert_eq!(args.guess, vec![10.0, 7.5]);
        assert_eq!(args.bounds, vec![(0.0, 20.0), (7.0, 9.5)]);
        assert_eq!(args.atmospheres, vec![Family::He]);
    }

    #[test]
    fn synthetic_conflicts_with_table_paths() {
        let res = Cli::try_parse_from(["wdfit", "list", "--synthetic", "--atmosphere-h", "h.csv"]);
        assert!(res.is_err());
    }

    #[test]
    fn bound_parser_rejects_garbage() {
        assert!(parse_bound("3").is_err());
        assert_eq!(parse_bound("-1:2").unwrap(), (-1.0, 2.0));
    }
}
