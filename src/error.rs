//! Error types.
//!
//! Library code returns [`FitError`]; the `wdfit` binary converts it into an
//! [`AppError`] carrying a process exit code:
//!
//! - `2`: bad input / configuration
//! - `3`: not enough data to fit
//! - `4`: numerical failure (domain, convergence)

use thiserror::Error;

/// Errors raised by the fitting engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// Malformed request: mismatched lengths, unknown filter, bad option.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Free-parameter layout does not match the initial guess.
    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Query outside an interpolator's support, or an extinction law's range.
    #[error("domain error: {message}")]
    Domain { message: String },

    /// Fewer usable filters than free parameters.
    #[error("insufficient data: {message}")]
    InsufficientData { message: String },

    /// Solver or sampler did not converge.
    #[error("convergence error: {message}")]
    Convergence { message: String },
}

impl FitError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            message: message.into(),
        }
    }

    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::InsufficientData {
            message: message.into(),
        }
    }

    pub fn convergence(message: impl Into<String>) -> Self {
        Self::Convergence {
            message: message.into(),
        }
    }

    /// Process exit code used by the CLI for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::Configuration { .. } | FitError::InvalidParameter { .. } => 2,
            FitError::InsufficientData { .. } => 3,
            FitError::Domain { .. } | FitError::Convergence { .. } => 4,
        }
    }

    /// Configuration-time errors abort a fit before any family is attempted.
    pub fn is_configuration_time(&self) -> bool {
        matches!(
            self,
            FitError::Configuration { .. }
                | FitError::InvalidParameter { .. }
                | FitError::InsufficientData { .. }
        )
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
