//! Core error type.
//!
//! Sub-crates define their own error enums and wrap `CoreError` as one
//! variant via `#[from]`.

use thiserror::Error;

/// Errors produced while validating core values or loading configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("coordinate ({lat}, {lon}) is outside the valid WGS-84 range")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("unknown role {0:?}, expected \"driver\" or \"passenger\"")]
    UnknownRole(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Shorthand result type for `rd-core`.
pub type CoreResult<T> = Result<T, CoreError>;
