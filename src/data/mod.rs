//! Synthetic inputs: analytic atmosphere grids and simulated photometry.

pub mod synthetic;

pub use synthetic::{GridSpec, SYNTHETIC_FILTERS, SyntheticStar, observe, synthetic_grid, synthetic_table};
