//! Presence-subsystem error type.

use thiserror::Error;

use rd_core::{CoreError, ParticipantId, Role};

/// Errors produced by `rd-presence`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PresenceError {
    #[error("no live position for participant {0}")]
    PositionNotFound(ParticipantId),

    #[error("participant {participant} is registered as {actual}, not {expected}")]
    RoleMismatch {
        participant: ParticipantId,
        expected:    Role,
        actual:      Role,
    },

    #[error("invalid proximity query: {0}")]
    InvalidQuery(String),

    #[error("invalid position: {0}")]
    InvalidPosition(#[from] CoreError),

    #[error("presence storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("invalid presence configuration: {0}")]
    Config(String),
}

impl PresenceError {
    /// `true` for transient storage failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PresenceError::StorageUnavailable(_))
    }

    /// Stable snake_case tag for the wire envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            PresenceError::PositionNotFound(_)   => "not_found",
            PresenceError::RoleMismatch { .. }   => "role_mismatch",
            PresenceError::InvalidQuery(_)
            | PresenceError::InvalidPosition(_)  => "invalid_request",
            PresenceError::StorageUnavailable(_) => "storage_unavailable",
            PresenceError::Config(_)             => "config",
        }
    }
}

pub type PresenceResult<T> = Result<T, PresenceError>;
