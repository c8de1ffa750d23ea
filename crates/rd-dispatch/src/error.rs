//! Dispatch error type.

use thiserror::Error;

use rd_core::{CoreError, ParticipantId, TripId};
use rd_presence::PresenceError;
use rd_route::RouteError;

use crate::TripStatus;

/// Errors produced by `rd-dispatch`.
///
/// Business-rule violations are deterministic and never retried.  Only
/// [`RouteUnavailable`](Self::RouteUnavailable) and
/// [`StorageUnavailable`](Self::StorageUnavailable) are transient.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("trip {0} not found")]
    TripNotFound(TripId),

    #[error("trip {0} has no review")]
    ReviewNotFound(TripId),

    #[error("participant {user} is not allowed to access trip {trip}")]
    Unauthorized { user: ParticipantId, trip: TripId },

    #[error("cannot {op} trip {trip} while it is {status}")]
    InvalidState {
        trip:   TripId,
        status: TripStatus,
        op:     &'static str,
    },

    #[error("trip {trip} cannot move from {from} to {to}")]
    InvalidTransition {
        trip: TripId,
        from: TripStatus,
        to:   TripStatus,
    },

    #[error("driver {driver} is not the suggested driver for trip {trip}")]
    NotSuggested { trip: TripId, driver: ParticipantId },

    #[error("no more candidate drivers for trip {0}")]
    NoMoreDrivers(TripId),

    #[error("no drivers available for trip {0}")]
    NoDriversAvailable(TripId),

    #[error("route oracle unavailable: {0}")]
    RouteUnavailable(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DispatchError {
    /// `true` for transient infrastructure failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RouteUnavailable(_) | Self::StorageUnavailable(_))
    }

    /// Stable snake_case tag for the wire envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TripNotFound(_) | Self::ReviewNotFound(_) => "not_found",
            Self::Unauthorized { .. }      => "unauthorized",
            Self::InvalidState { .. }      => "invalid_state",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotSuggested { .. }      => "not_suggested",
            Self::NoMoreDrivers(_)         => "no_more_drivers",
            Self::NoDriversAvailable(_)    => "no_drivers_available",
            Self::RouteUnavailable(_)      => "route_unavailable",
            Self::StorageUnavailable(_)    => "storage_unavailable",
            Self::InvalidRequest(_)        => "invalid_request",
            Self::Config(_)                => "config",
        }
    }
}

impl From<CoreError> for DispatchError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Config(msg) => Self::Config(msg),
            other                  => Self::InvalidRequest(other.to_string()),
        }
    }
}

impl From<RouteError> for DispatchError {
    fn from(e: RouteError) -> Self {
        match e {
            RouteError::InvalidEndpoint(inner) => Self::InvalidRequest(inner.to_string()),
            other                              => Self::RouteUnavailable(other.to_string()),
        }
    }
}

impl From<PresenceError> for DispatchError {
    fn from(e: PresenceError) -> Self {
        match e {
            PresenceError::InvalidQuery(_) | PresenceError::InvalidPosition(_) => {
                Self::InvalidRequest(e.to_string())
            }
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

/// Shorthand result type for `rd-dispatch`.
pub type DispatchResult<T> = Result<T, DispatchError>;
