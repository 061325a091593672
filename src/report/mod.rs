//! Reporting utilities: terminal summaries of fits and atmosphere tables.

pub mod format;

pub use format::{format_fit_summary, format_parameters};
