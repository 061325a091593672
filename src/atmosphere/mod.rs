//! Atmosphere model tables and the interpolators built from them.
//!
//! - `table`: one family's tabulated samples ([`AtmosphereTable`])
//! - `grid`: all loaded families + interpolator construction ([`AtmosphereGrid`])
//! - `cache`: the shared, build-once interpolator cache ([`InterpolatorCache`])

pub mod cache;
pub mod grid;
pub mod table;

pub use cache::{InterpolatorCache, InterpolatorKey};
pub use grid::AtmosphereGrid;
pub use table::{AtmosphereTable, ColumnInfo, ColumnKind};
