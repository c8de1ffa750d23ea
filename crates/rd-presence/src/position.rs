//! Position records as written by participants and returned by queries.

use rd_core::{GeoPoint, ParticipantId, Role, Timestamp};

/// A participant's most recent presence.
///
/// Overwritten on every update (last write wins per participant).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub participant_id: ParticipantId,
    pub role:           Role,
    pub point:          GeoPoint,
    /// Ground speed as reported by the client.
    pub speed:          f64,
    /// Free-form heading as reported by the client (e.g. `"NE"` or `"45"`).
    pub heading:        String,
    pub captured_at:    Timestamp,
}

/// A [`Position`] annotated with its distance from a query origin.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NearbyPosition {
    pub position:    Position,
    pub distance_km: f64,
}

/// Input to [`PresenceStore::set_position`][crate::PresenceStore::set_position].
///
/// `captured_at` defaults to the store clock's "now" when left `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub participant_id: ParticipantId,
    pub role:           Role,
    pub point:          GeoPoint,
    pub speed:          f64,
    pub heading:        String,
    pub captured_at:    Option<Timestamp>,
}

impl PositionUpdate {
    pub fn new(participant_id: ParticipantId, role: Role, lat: f64, lon: f64) -> Self {
        Self {
            participant_id,
            role,
            point: GeoPoint::new(lat, lon),
            speed: 0.0,
            heading: String::new(),
            captured_at: None,
        }
    }

    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = heading.into();
        self
    }

    pub fn captured_at(mut self, at: Timestamp) -> Self {
        self.captured_at = Some(at);
        self
    }
}
