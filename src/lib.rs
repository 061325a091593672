//! `wd-photfit` library crate.
//!
//! Fits white dwarf photometry against tabulated atmosphere models: bolometric
//! magnitude (or effective temperature), surface gravity and distance are
//! recovered per atmosphere family by local minimisation, least squares, or
//! ensemble sampling.
//!
//! The `wdfit` binary only parses arguments and prints; everything it runs
//! lives here:
//!
//! - `atmosphere` / `interp`: tabulated grids and the cached surfaces built on them
//! - `models` / `reddening`: predicted apparent magnitudes and the χ² objective
//! - `fit`: the per-family driver and its search strategies
//! - `io` / `report`: CSV ingestion, JSON/CSV export, text summaries

pub mod app;
pub mod atmosphere;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod interp;
pub mod io;
pub mod math;
pub mod models;
pub mod reddening;
pub mod report;
