//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::atmosphere::{ColumnInfo, ColumnKind};
use crate::domain::{Family, FitRequest, FitResult, FitResults, FitStatus};

/// Full run summary: request, one block per family, and the preferred family.
pub fn format_fit_summary(request: &FitRequest, results: &FitResults) -> String {
    let mut out = String::new();

    out.push_str("=== wdfit - white dwarf photometric fit ===\n");
    out.push_str(&format!("Method: {}\n", request.method.display_name()));
    out.push_str(&format!(
        "Filters: {} ({} observed)\n",
        request.filters().join(", "),
        request.present().count()
    ));
    let free: Vec<&str> = request.independent.iter().map(|p| p.label()).collect();
    out.push_str(&format!("Free: {}", free.join(", ")));
    match request.distance {
        None => out.push_str(", distance\n"),
        Some(d) => out.push_str(&format!(" | distance fixed at {:.3} ± {:.3} pc\n", d.value, d.err)),
    }
    if !request.logg_is_free() {
        out.push_str(&format!("logg fixed at {:.3}\n", request.logg));
    }
    if let Some(r) = request.reddening.filter(|r| !r.is_null()) {
        out.push_str(&format!("Reddening: E(B-V)={:.3} Rv={:.2} ({:?})\n", r.ebv, r.rv, r.mode));
    }

    for result in results.iter() {
        out.push('\n');
        out.push_str(&format_family(result));
    }

    out.push('\n');
    match results.best() {
        Some(best) => out.push_str(&format!(
            "Preferred atmosphere: {} (chi2={:.3})\n",
            best.family, best.chi2
        )),
        None => out.push_str("No atmosphere converged.\n"),
    }
    out
}

fn format_family(result: &FitResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("[{}] ", family_title(result.family)));

    if let FitStatus::Failed { reason } = &result.status {
        out.push_str(&format!("FAILED: {reason}\n"));
        if result.x.is_empty() {
            return out;
        }
    } else {
        out.push_str("converged\n");
    }

    for (i, label) in result.labels.iter().enumerate() {
        let value = result.x.get(i).copied().unwrap_or(f64::NAN);
        match result.uncertainties.as_ref().and_then(|u| u.get(i)) {
            Some(sigma) => out.push_str(&format!("  {label:<9} {value:>12.4} ± {sigma:.4}\n")),
            None => out.push_str(&format!("  {label:<9} {value:>12.4}\n")),
        }
    }

    let reduced = result
        .reduced_chi2
        .map(|r| format!("{r:.3}"))
        .unwrap_or_else(|| "n/a".to_string());
    out.push_str(&format!(
        "  chi2={:.4} dof={} reduced={} iters={} evals={}\n",
        result.chi2, result.dof, reduced, result.iterations, result.evaluations
    ));

    if let Some(d) = &result.derived {
        out.push_str(&format!(
            "  Teff={:.0} K  Mbol={:.3}  logg={:.3}  d={:.2} pc\n",
            d.teff, d.mbol, d.logg, d.distance
        ));
        for (name, value) in &d.quantities {
            out.push_str(&format!("  {name}={value:.4}\n"));
        }
    }

    if !result.predicted.is_empty() {
        out.push_str(&format!("  {:<8} {:>9} {:>9} {:>7}\n", "filter", "model", "obs", "pull"));
        for p in &result.predicted {
            let obs = p.observed.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".to_string());
            let pull = p.pull().map(|v| format!("{v:+.2}")).unwrap_or_else(|| "-".to_string());
            out.push_str(&format!("  {:<8} {:>9.3} {:>9} {:>7}\n", p.filter, p.predicted, obs, pull));
        }
    }
    out
}

fn family_title(family: Family) -> &'static str {
    match family {
        Family::H => "H (DA)",
        Family::He => "He (DB)",
    }
}

/// Table of the columns an atmosphere family provides.
pub fn format_parameters(family: Family, columns: &[ColumnInfo]) -> String {
    let mut out = format!("{} atmosphere columns:\n", family_title(family));
    for c in columns {
        let kind = match c.kind {
            ColumnKind::Axis => "axis",
            ColumnKind::Filter => "filter",
            ColumnKind::Quantity => "quantity",
        };
        let wl = c.wavelength.map(|w| format!("{w:.0} Å")).unwrap_or_default();
        out.push_str(&format!(
            "  {:<10} {:<8} [{:.4}, {:.4}] {wl}\n",
            c.name, kind, c.min, c.max
        ));
    }
    out
}
