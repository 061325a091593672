//! Mapping between the flat parameter vector and physical parameters.
//!
//! The vector holds the free parameters in the order given by
//! `FitRequest::independent`, with distance appended last when it is free.

use serde::Serialize;

use crate::domain::{FitRequest, Parameter};
use crate::error::FitError;

pub const DISTANCE_LABEL: &str = "distance";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum LoggSlot {
    Free(usize),
    Fixed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DistanceSlot {
    Free(usize),
    /// Fixed distance (pc) with 1-sigma error.
    Fixed { value: f64, err: f64 },
}

/// A parameter vector resolved into physical values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Mbol or Teff, whichever is the primary parameter.
    pub primary: f64,
    pub logg: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamLayout {
    primary: Parameter,
    primary_index: usize,
    logg: LoggSlot,
    distance: DistanceSlot,
    labels: Vec<String>,
}

impl ParamLayout {
    pub fn from_request(request: &FitRequest) -> Result<Self, FitError> {
        let primary = request.primary().ok_or_else(|| {
            FitError::configuration("exactly one of Mbol or Teff must be an independent parameter")
        })?;
        let index_of = |p: Parameter| request.independent.iter().position(|&q| q == p);

        let primary_index = index_of(primary).ok_or_else(|| FitError::configuration("primary parameter missing"))?;
        let logg = match index_of(Parameter::Logg) {
            Some(i) => LoggSlot::Free(i),
            None => LoggSlot::Fixed(request.logg),
        };
        let distance = match request.distance {
            Some(d) => DistanceSlot::Fixed {
                value: d.value,
                err: d.err,
            },
            None => DistanceSlot::Free(request.independent.len()),
        };

        let mut labels: Vec<String> = request.independent.iter().map(|p| p.label().to_string()).collect();
        if matches!(distance, DistanceSlot::Free(_)) {
            labels.push(DISTANCE_LABEL.to_string());
        }

        Ok(Self {
            primary,
            primary_index,
            logg,
            distance,
            labels,
        })
    }

    pub fn primary(&self) -> Parameter {
        self.primary
    }

    /// Position of the primary parameter in the vector.
    pub fn primary_index(&self) -> usize {
        self.primary_index
    }

    pub fn logg(&self) -> LoggSlot {
        self.logg
    }

    pub fn distance(&self) -> DistanceSlot {
        self.distance
    }

    pub fn ndim(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Split a parameter vector into physical values.
    pub fn point(&self, params: &[f64]) -> Result<Point, FitError> {
        if params.len() != self.ndim() {
            return Err(FitError::invalid_parameter(format!(
                "expected {} parameter(s) ({}), got {}",
                self.ndim(),
                self.labels.join(", "),
                params.len()
            )));
        }
        if let Some(i) = params.iter().position(|v| !v.is_finite()) {
            return Err(FitError::domain(format!("{} is not finite", self.labels[i])));
        }

        let logg = match self.logg {
            LoggSlot::Free(i) => params[i],
            LoggSlot::Fixed(v) => v,
        };
        let distance = match self.distance {
            DistanceSlot::Free(i) => params[i],
            DistanceSlot::Fixed { value, .. } => value,
        };
        if distance <= 0.0 {
            return Err(FitError::domain(format!("distance must be > 0 (got {distance})")));
        }

        Ok(Point {
            primary: params[self.primary_index],
            logg,
            distance,
        })
    }
}

/// Distance modulus `5 log10(d) - 5` for `d` in pc.
pub fn distance_modulus(distance: f64) -> f64 {
    5.0 * distance.log10() - 5.0
}

/// Magnitude error contributed by a distance uncertainty.
pub fn distance_modulus_error(distance: f64, err: f64) -> f64 {
    5.0 / std::f64::consts::LN_10 * err / distance
}
