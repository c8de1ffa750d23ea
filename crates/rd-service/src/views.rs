//! Response payload shapes.

use serde::{Deserialize, Serialize};

use rd_core::{ParticipantId, Role, Timestamp};
use rd_dispatch::Trip;
use rd_presence::{NearbyPosition, Position};

/// A position as seen on the wire, optionally with its distance from the
/// query origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub participant_id: ParticipantId,
    pub role:           Role,
    pub latitude:       f64,
    pub longitude:      f64,
    pub speed:          f64,
    pub heading:        String,
    pub captured_at:    Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km:    Option<f64>,
}

impl From<Position> for PositionView {
    fn from(p: Position) -> Self {
        Self {
            participant_id: p.participant_id,
            role:           p.role,
            latitude:       p.point.lat,
            longitude:      p.point.lon,
            speed:          p.speed,
            heading:        p.heading,
            captured_at:    p.captured_at,
            distance_km:    None,
        }
    }
}

impl From<NearbyPosition> for PositionView {
    fn from(n: NearbyPosition) -> Self {
        Self { distance_km: Some(n.distance_km), ..Self::from(n.position) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListAllView {
    pub positions:   Vec<PositionView>,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTripView {
    pub trip:                       Trip,
    pub estimated_duration_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectView {
    pub rejected:    ParticipantId,
    pub next_driver: Option<ParticipantId>,
}
