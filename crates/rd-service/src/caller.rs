//! Caller identity as asserted by the upstream gateway.

use serde::{Deserialize, Serialize};

use rd_core::{ParticipantId, Role};

/// An already-authenticated participant.  Credentials are never checked
/// here; only that the identity fits the operation and the trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id:   ParticipantId,
    pub role: Role,
}

impl Caller {
    pub fn driver(id: u32) -> Self {
        Self { id: ParticipantId(id), role: Role::Driver }
    }

    pub fn passenger(id: u32) -> Self {
        Self { id: ParticipantId(id), role: Role::Passenger }
    }

    /// `Err` with a human-readable reason unless the caller acts as `role`.
    pub fn require(&self, role: Role, op: &str) -> Result<(), String> {
        if self.role == role {
            Ok(())
        } else {
            Err(format!("{op} requires a {role}, but {} is a {}", self.id, self.role))
        }
    }
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.role, self.id)
    }
}
