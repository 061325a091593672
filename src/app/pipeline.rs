//! Shared pipeline logic behind the CLI subcommands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! resolve data sources -> load tables -> build the request -> fit
//!
//! so `app` can focus on presentation (printing and exports).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::atmosphere::{AtmosphereGrid, InterpolatorCache};
use crate::cli::{DataArgs, FitArgs, MethodKind, SimulateArgs};
use crate::data::synthetic::{GridSpec, SyntheticStar, observe, synthetic_grid};
use crate::domain::{
    EnsembleOptions, ExtinctionMode, Family, FitMethod, FitRequest, FitResults, LeastSquaresOptions,
    LocalMinimizeOptions, Observation, Reddening,
};
use crate::error::AppError;
use crate::fit::Fitter;
use crate::io::{apply_passbands, load_atmosphere_table, load_filter_extinction, load_passbands, load_photometry};
use crate::reddening::{Ccm89, ExtinctionModel, FilterExtinction};

pub const ENV_ATMOSPHERE_H: &str = "WDFIT_ATMOSPHERE_H";
pub const ENV_ATMOSPHERE_HE: &str = "WDFIT_ATMOSPHERE_HE";
pub const ENV_PASSBANDS: &str = "WDFIT_PASSBANDS";
pub const ENV_FILTER_EXTINCTION: &str = "WDFIT_FILTER_EXTINCTION";

/// Atmosphere grid plus the optional tabulated extinction law.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub grid: Arc<AtmosphereGrid>,
    pub filter_extinction: Option<Arc<dyn FilterExtinction>>,
}

/// All computed outputs of a single `wdfit fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub request: FitRequest,
    pub results: FitResults,
}

/// Files written by `wdfit simulate`.
#[derive(Debug, Clone)]
pub struct SimulateOutput {
    pub files: Vec<PathBuf>,
    pub observations: Vec<Observation>,
}

/// Command-line flag first, then the environment.
fn resolve_path(flag: Option<&PathBuf>, var: &str) -> Option<PathBuf> {
    flag.cloned()
        .or_else(|| std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from))
}

/// Load the tables `families` needs.
pub fn load_data(args: &DataArgs, families: &[Family]) -> Result<LoadedData, AppError> {
    let filter_extinction = match resolve_path(args.filter_extinction.as_ref(), ENV_FILTER_EXTINCTION) {
        Some(path) => {
            let law: Arc<dyn FilterExtinction> = Arc::new(load_filter_extinction(&path)?.value);
            Some(law)
        }
        None => None,
    };

    if args.synthetic {
        log::info!("using the built-in synthetic atmosphere grid");
        let grid = synthetic_grid(&GridSpec::default(), InterpolatorCache::global())?;
        return Ok(LoadedData {
            grid: Arc::new(grid),
            filter_extinction,
        });
    }

    let passbands = resolve_path(args.passbands.as_ref(), ENV_PASSBANDS)
        .map(|path| load_passbands(&path))
        .transpose()?
        .map(|ingested| ingested.value);

    let mut grid = AtmosphereGrid::new();
    for &family in families {
        let (flag, var, option) = match family {
            Family::H => (args.atmosphere_h.as_ref(), ENV_ATMOSPHERE_H, "--atmosphere-h"),
            Family::He => (args.atmosphere_he.as_ref(), ENV_ATMOSPHERE_HE, "--atmosphere-he"),
        };
        let path = resolve_path(flag, var).ok_or_else(|| {
            AppError::new(
                2,
                format!("No {family} atmosphere table: pass {option}, set {var}, or use --synthetic."),
            )
        })?;
        let mut table = load_atmosphere_table(&path, family)?.value;
        if let Some(passbands) = &passbands {
            table = apply_passbands(table, passbands)?;
        }
        grid.insert(table);
    }

    Ok(LoadedData {
        grid: Arc::new(grid),
        filter_extinction,
    })
}

/// Translate `wdfit fit` flags into a validated request.
pub fn build_request(args: &FitArgs, observations: &[Observation]) -> Result<FitRequest, AppError> {
    let filters: Vec<&str> = observations.iter().map(|o| o.filter.as_str()).collect();
    let mags: Vec<Option<f64>> = observations.iter().map(|o| o.photometry.map(|p| p.mag)).collect();
    let errs: Vec<f64> = observations
        .iter()
        .map(|o| o.photometry.map_or(f64::NAN, |p| p.err))
        .collect();

    let bounds = (!args.bounds.is_empty()).then(|| args.bounds.clone());
    let method = match args.method {
        MethodKind::Minimize => {
            let defaults = LocalMinimizeOptions::default();
            FitMethod::LocalMinimize(LocalMinimizeOptions {
                algorithm: args.algorithm,
                max_iters: args.max_iters.unwrap_or(defaults.max_iters),
                tolerance: args.tolerance.unwrap_or(defaults.tolerance),
            })
        }
        MethodKind::LeastSquares => {
            let defaults = LeastSquaresOptions::default();
            FitMethod::LeastSquares(LeastSquaresOptions {
                bounds,
                max_iters: args.max_iters.map_or(defaults.max_iters, |n| n as usize),
                ..defaults
            })
        }
        MethodKind::Ensemble => FitMethod::EnsembleSample(EnsembleOptions {
            nwalkers: args.nwalkers,
            nsteps: args.nsteps,
            nburn: args.nburn,
            refine_bounds: args.refine,
            prior_bounds: bounds,
            seed: args.seed,
            parallel: !args.serial,
            ..EnsembleOptions::default()
        }),
    };

    let mut request = FitRequest::new(&filters, &mags, &errs, &args.independent, &args.guess)?
        .with_logg(args.logg)
        .with_method(method)
        .with_atmospheres(&args.atmospheres)
        .with_interpolation(args.interpolation)
        .with_reuse_interpolator(!args.rebuild);
    if args.strict {
        request = request.with_allow_none(false);
    }
    if let Some(d) = args.distance {
        request = request.with_distance(d, args.distance_err);
    }
    if args.ebv != 0.0 {
        request = request.with_reddening(Reddening {
            rv: args.rv,
            ebv: args.ebv,
            mode: args.extinction,
        });
    }
    request.validate()?;
    Ok(request)
}

/// Execute `wdfit fit` and return the request with its results.
pub fn run_fit(args: &FitArgs) -> Result<FitRun, AppError> {
    let observations = load_photometry(&args.photometry)?.value;
    let request = build_request(args, &observations)?;
    let data = load_data(&args.data, &request.atmospheres)?;

    let mut fitter = Fitter::new(data.grid);
    if let Some(law) = data.filter_extinction {
        fitter = fitter.with_filter_extinction(law);
    }
    fitter.fit(&request)?;

    Ok(FitRun {
        request,
        results: fitter.take_results(),
    })
}

/// Execute `wdfit simulate`: grid tables, passbands and one star's photometry.
pub fn run_simulate(args: &SimulateArgs) -> Result<SimulateOutput, AppError> {
    std::fs::create_dir_all(&args.out_dir).map_err(|e| {
        AppError::new(2, format!("Failed to create output directory '{}': {e}", args.out_dir.display()))
    })?;

    let grid = synthetic_grid(&GridSpec::default(), Arc::new(InterpolatorCache::new()))?;
    let table = grid.table(args.family)?;
    let filters: Vec<&str> = table.filter_names().collect();

    let extinction = if args.ebv != 0.0 {
        let names: Vec<String> = filters.iter().map(|f| f.to_string()).collect();
        let wavelengths: Vec<Option<f64>> = filters.iter().map(|f| table.wavelength(f)).collect();
        let reddening = Reddening {
            rv: args.rv,
            ebv: args.ebv,
            mode: ExtinctionMode::Interpolated,
        };
        Some(ExtinctionModel::resolve(Some(&reddening), &names, &wavelengths, None, &Ccm89)?)
    } else {
        None
    };

    let star = SyntheticStar::new(args.family, args.mbol, args.logg, args.distance);
    let observations: Vec<Observation> = observe(&grid, &star, &filters, args.err, extinction.as_ref(), args.seed)?
        .into_iter()
        .map(|o| {
            if args.drop.contains(&o.filter) {
                Observation::absent(o.filter)
            } else {
                o
            }
        })
        .collect();

    let mut files = Vec::new();
    for family in Family::ALL {
        let path = simulated_table_path(&args.out_dir, family);
        crate::io::write_atmosphere_csv(&path, grid.table(family)?)?;
        files.push(path);
    }
    let passbands = args.out_dir.join("passbands.csv");
    crate::io::write_passbands_csv(&passbands, table)?;
    files.push(passbands);
    let photometry = args.out_dir.join("photometry.csv");
    crate::io::write_photometry_csv(&photometry, &observations)?;
    files.push(photometry);

    Ok(SimulateOutput { files, observations })
}

/// Where `wdfit simulate` writes a family's atmosphere table.
pub fn simulated_table_path(dir: &Path, family: Family) -> PathBuf {
    dir.join(format!("atmosphere_{}.csv", family.display_name().to_ascii_lowercase()))
}
