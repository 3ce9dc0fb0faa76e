//! Error types.
//!
//! The library reports configuration and data problems through [`FitError`].
//! Solver outcomes (converged, max iterations, diverged) are *not* errors: they are
//! part of the fit result so callers can inspect a best-effort fit.
//!
//! The binary wraps everything into [`AppError`], which carries a process exit code.

use thiserror::Error;

/// Library error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// The expression is syntactically invalid.
    #[error("parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// The expression references a name that is not `x`, a constant, a function
    /// or a declared parameter.
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    /// A custom model declares a parameter its expression never references.
    #[error("parameter '{0}' is declared but not used by the expression")]
    UnusedParameter(String),

    /// No model with this (category, type) is registered.
    #[error("unknown model '{name}' in category '{category}'")]
    UnknownModel { category: String, name: String },

    /// The data source yielded no usable samples.
    #[error("the data source contains no usable samples")]
    EmptySource,

    /// `recalculate()` was called before `configure()`.
    #[error("the fit session has not been configured")]
    NotConfigured,

    /// Invalid configuration values (bounds, lengths, option ranges...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A lock guarding shared fit state was poisoned by a panicking thread.
    #[error("fit session lock poisoned")]
    Poisoned,
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, FitError>;

impl FitError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        FitError::Parse {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        FitError::InvalidConfig(message.into())
    }

    /// Exit code used by the `fitc` binary for this error.
    ///
    /// - 2: bad input / configuration
    /// - 3: no data
    /// - 4: computation / runtime failure
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::Parse { .. }
            | FitError::UnknownIdentifier(_)
            | FitError::UnusedParameter(_)
            | FitError::UnknownModel { .. }
            | FitError::InvalidConfig(_) => 2,
            FitError::EmptySource => 3,
            FitError::NotConfigured | FitError::Poisoned => 4,
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_errors_map_to_exit_codes() {
        let app: AppError = FitError::EmptySource.into();
        assert_eq!(app.exit_code(), 3);

        let app: AppError = FitError::UnknownIdentifier("B3".to_string()).into();
        assert_eq!(app.exit_code(), 2);
        assert_eq!(app.to_string(), "unknown identifier 'B3'");
    }
}
