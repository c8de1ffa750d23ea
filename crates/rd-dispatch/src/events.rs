//! Trip lifecycle notifications.
//!
//! Publication is fire-and-forget: the engine publishes only after a state
//! write has committed, and a failing sink is logged and otherwise ignored.

use thiserror::Error;

use rd_core::{ParticipantId, TripId};

use crate::Trip;

/// Something observable happened to a trip.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum TripEvent {
    Created {
        trip:          Trip,
        duration_secs: u64,
        candidates:    usize,
    },
    Accepted {
        trip: Trip,
    },
    Rejected {
        trip_id:      TripId,
        passenger_id: ParticipantId,
        driver_id:    ParticipantId,
        next_driver:  Option<ParticipantId>,
    },
    StatusUpdated {
        trip: Trip,
    },
    Cancelled {
        trip: Trip,
    },
    Reviewed {
        trip: Trip,
    },
    PassengerHistory {
        passenger_id: ParticipantId,
        trips:        usize,
    },
    DriverHistory {
        driver_id: ParticipantId,
        trips:     usize,
    },
}

impl TripEvent {
    /// Routing name the event is published under.
    pub fn name(&self) -> &'static str {
        match self {
            TripEvent::Created { .. }          => "user.createTrip",
            TripEvent::Accepted { .. }         => "driver.acceptTrip",
            TripEvent::Rejected { .. }         => "driver.rejectTrip",
            TripEvent::StatusUpdated { .. }    => "trip.updateStatus",
            TripEvent::Cancelled { .. }        => "trip.cancel",
            TripEvent::Reviewed { .. }         => "user.reviewTrip",
            TripEvent::PassengerHistory { .. } => "user.tripHistory",
            TripEvent::DriverHistory { .. }    => "driver.tripHistory",
        }
    }

    /// The trip this event concerns, if it concerns exactly one.
    pub fn trip_id(&self) -> Option<TripId> {
        match self {
            TripEvent::Created { trip, .. }
            | TripEvent::Accepted { trip }
            | TripEvent::StatusUpdated { trip }
            | TripEvent::Cancelled { trip }
            | TripEvent::Reviewed { trip } => Some(trip.id),
            TripEvent::Rejected { trip_id, .. } => Some(*trip_id),
            TripEvent::PassengerHistory { .. } | TripEvent::DriverHistory { .. } => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("event publication failed: {0}")]
pub struct PublishError(pub String);

/// Destination for [`TripEvent`]s.
///
/// Called inline on the request path, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &TripEvent) -> Result<(), PublishError>;
}

/// Drops every event.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: &TripEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Writes one `info` line per event.
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &TripEvent) -> Result<(), PublishError> {
        match event.trip_id() {
            Some(trip) => log::info!("[EVENT] {} {trip}", event.name()),
            None       => log::info!("[EVENT] {}", event.name()),
        }
        Ok(())
    }
}
