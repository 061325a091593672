//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - result and table exports (JSON/CSV) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
