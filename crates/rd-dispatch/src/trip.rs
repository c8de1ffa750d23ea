//! The trip record and its state machine.
//!
//! ```text
//! REQUESTED ──accept──▶ ACCEPTED ──start──▶ STARTED ──complete──▶ COMPLETED
//!     │                    │                   │
//!     └────────cancel──────┴───────cancel──────┴──▶ CANCELLED
//! ```
//!
//! Every transition here is a pure method on [`Trip`]: it checks its
//! preconditions and either mutates the record or returns an error leaving it
//! untouched.  The engine runs these inside a single repository update.

use std::str::FromStr;

use rd_core::{CoreError, GeoPoint, ParticipantId, Timestamp, TripId};

use crate::{DispatchError, DispatchResult, ReviewPolicy};

// ── TripStatus ────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum TripStatus {
    Requested,
    Accepted,
    Started,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Requested => "REQUESTED",
            TripStatus::Accepted  => "ACCEPTED",
            TripStatus::Started   => "STARTED",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    /// `true` for statuses no transition leaves.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    /// The only forward moves a driver may request via a status update.
    #[inline]
    pub fn can_advance_to(self, next: TripStatus) -> bool {
        matches!(
            (self, next),
            (TripStatus::Accepted, TripStatus::Started) | (TripStatus::Started, TripStatus::Completed)
        )
    }
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REQUESTED" => Ok(TripStatus::Requested),
            "ACCEPTED"  => Ok(TripStatus::Accepted),
            "STARTED"   => Ok(TripStatus::Started),
            "COMPLETED" => Ok(TripStatus::Completed),
            "CANCELLED" => Ok(TripStatus::Cancelled),
            other       => Err(CoreError::Parse(format!("unknown trip status {other:?}"))),
        }
    }
}

// ── Trip ──────────────────────────────────────────────────────────────────────

/// The authoritative lifecycle record of one ride.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trip {
    pub id:             TripId,
    pub passenger_id:   ParticipantId,
    /// `None` until a driver accepts.
    pub driver_id:      Option<ParticipantId>,
    pub origin:         GeoPoint,
    pub destination:    GeoPoint,
    pub status:         TripStatus,
    /// Road distance from the route oracle, kilometres.
    pub distance_km:    f64,
    pub fare:           f64,
    pub payment_method: String,
    pub rating:         Option<u8>,
    pub comment:        Option<String>,
    pub created_at:     Timestamp,
    pub updated_at:     Timestamp,
    pub started_at:     Option<Timestamp>,
    pub completed_at:   Option<Timestamp>,
    pub cancelled_at:   Option<Timestamp>,
    pub cancelled_by:   Option<ParticipantId>,
}

/// A passenger's rating of a trip.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Review {
    pub trip_id:      TripId,
    pub passenger_id: ParticipantId,
    pub rating:       u8,
    pub comment:      String,
}

impl Trip {
    #[inline]
    pub fn is_participant(&self, user: ParticipantId) -> bool {
        self.passenger_id == user || self.driver_id == Some(user)
    }

    fn require_status(&self, expected: TripStatus, op: &'static str) -> DispatchResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(DispatchError::InvalidState { trip: self.id, status: self.status, op })
        }
    }

    /// Only the passenger or the assigned driver may read a trip.
    pub fn authorize_read(&self, user: ParticipantId) -> DispatchResult<()> {
        if self.is_participant(user) {
            Ok(())
        } else {
            Err(DispatchError::Unauthorized { user, trip: self.id })
        }
    }

    /// Fails unless the trip is still waiting for a driver.
    pub fn require_requested(&self, op: &'static str) -> DispatchResult<()> {
        self.require_status(TripStatus::Requested, op)
    }

    // ── Transitions ───────────────────────────────────────────────────────

    /// Assign `driver`.  Whether `driver` is the suggested one is checked by
    /// the engine against the candidate queue, not here.
    pub fn accept(&mut self, driver: ParticipantId, now: Timestamp) -> DispatchResult<()> {
        self.require_requested("accept")?;
        self.driver_id  = Some(driver);
        self.status     = TripStatus::Accepted;
        self.updated_at = now;
        Ok(())
    }

    /// Driver-initiated forward move: ACCEPTED → STARTED or
    /// STARTED → COMPLETED.
    pub fn advance(
        &mut self,
        driver: ParticipantId,
        next:   TripStatus,
        now:    Timestamp,
    ) -> DispatchResult<()> {
        if self.driver_id != Some(driver) {
            return Err(DispatchError::Unauthorized { user: driver, trip: self.id });
        }
        if !self.status.can_advance_to(next) {
            return Err(DispatchError::InvalidTransition { trip: self.id, from: self.status, to: next });
        }
        match next {
            TripStatus::Started   => self.started_at = Some(now),
            TripStatus::Completed => self.completed_at = Some(now),
            _ => {}
        }
        self.status     = next;
        self.updated_at = now;
        Ok(())
    }

    /// Cancel on behalf of the passenger or the assigned driver.
    pub fn cancel(&mut self, by: ParticipantId, now: Timestamp) -> DispatchResult<()> {
        if !self.is_participant(by) {
            return Err(DispatchError::Unauthorized { user: by, trip: self.id });
        }
        if self.status.is_terminal() {
            return Err(DispatchError::InvalidState { trip: self.id, status: self.status, op: "cancel" });
        }
        self.status       = TripStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancelled_by = Some(by);
        self.updated_at   = now;
        Ok(())
    }

    /// Record the passenger's rating and comment.
    pub fn review(
        &mut self,
        by:      ParticipantId,
        rating:  u8,
        comment: String,
        policy:  ReviewPolicy,
        now:     Timestamp,
    ) -> DispatchResult<()> {
        if by != self.passenger_id {
            return Err(DispatchError::Unauthorized { user: by, trip: self.id });
        }
        if !(1..=5).contains(&rating) {
            return Err(DispatchError::InvalidRequest(format!("rating must be 1..=5, got {rating}")));
        }
        if policy.requires_completion && self.status != TripStatus::Completed {
            return Err(DispatchError::InvalidState { trip: self.id, status: self.status, op: "review" });
        }
        if !policy.allow_overwrite && self.rating.is_some() {
            return Err(DispatchError::InvalidState { trip: self.id, status: self.status, op: "re-review" });
        }
        self.rating     = Some(rating);
        self.comment    = Some(comment);
        self.updated_at = now;
        Ok(())
    }

    /// The review, readable only by the trip's passenger.
    pub fn review_for(&self, user: ParticipantId) -> DispatchResult<Review> {
        if user != self.passenger_id {
            return Err(DispatchError::Unauthorized { user, trip: self.id });
        }
        let rating = self.rating.ok_or(DispatchError::ReviewNotFound(self.id))?;
        Ok(Review {
            trip_id:      self.id,
            passenger_id: self.passenger_id,
            rating,
            comment:      self.comment.clone().unwrap_or_default(),
        })
    }
}
