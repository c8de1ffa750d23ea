//! Routing error type.

use std::time::Duration;

use thiserror::Error;

use rd_core::{CoreError, GeoPoint};

/// Errors produced by a [`RouteOracle`][crate::RouteOracle].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouteError {
    #[error("no route from {from} to {to}")]
    NoRoute { from: GeoPoint, to: GeoPoint },

    #[error("route oracle did not answer within {0:?}")]
    Timeout(Duration),

    #[error("route oracle unavailable: {0}")]
    Unavailable(String),

    #[error("invalid route endpoint: {0}")]
    InvalidEndpoint(#[from] CoreError),
}

impl RouteError {
    /// `true` for failures a caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RouteError::Timeout(_) | RouteError::Unavailable(_))
    }
}

pub type RouteResult<T> = Result<T, RouteError>;
