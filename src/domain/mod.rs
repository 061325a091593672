//! Domain types used throughout the fitter.
//!
//! This module defines:
//!
//! - input enums and options (`Family`, `Parameter`, `FitMethod`, ...)
//! - the explicit fit request (`FitRequest`)
//! - fit outputs (`FitResult`, `FitResults`, `DerivedParams`)

pub mod request;
pub mod result;
pub mod types;

pub use request::*;
pub use result::*;
pub use types::*;
