//! Driver lookup for candidate acquisition.

use std::future::{ready, Future};
use std::sync::Arc;

use rd_core::{GeoPoint, ParticipantId, Role};
use rd_presence::{PresenceError, PresenceStore};

use crate::DispatchResult;

/// Answers "which drivers are near this passenger" for one search radius.
pub trait DriverLocator: Send + Sync {
    /// Up to `limit` driver ids within `radius_km`, nearest first.
    ///
    /// The search is centred on `passenger`'s live position, or on `pickup`
    /// when the passenger has none.
    fn drivers_near(
        &self,
        passenger: ParticipantId,
        pickup:    GeoPoint,
        radius_km: f64,
        limit:     usize,
    ) -> impl Future<Output = DispatchResult<Vec<ParticipantId>>> + Send;
}

impl DriverLocator for PresenceStore {
    fn drivers_near(
        &self,
        passenger: ParticipantId,
        pickup:    GeoPoint,
        radius_km: f64,
        limit:     usize,
    ) -> impl Future<Output = DispatchResult<Vec<ParticipantId>>> + Send {
        ready(locate(self, passenger, pickup, radius_km, limit))
    }
}

fn locate(
    store:     &PresenceStore,
    passenger: ParticipantId,
    pickup:    GeoPoint,
    radius_km: f64,
    limit:     usize,
) -> DispatchResult<Vec<ParticipantId>> {
    let center = match store.get_position(passenger) {
        Ok(p)                                  => p.point,
        Err(PresenceError::PositionNotFound(_)) => pickup,
        Err(e)                                 => return Err(e.into()),
    };
    let hits = store.nearest_to(Role::Driver, center, radius_km, limit)?;
    Ok(hits
        .into_iter()
        .map(|h| h.position.participant_id)
        .filter(|id| *id != passenger)
        .collect())
}

impl<T: DriverLocator> DriverLocator for Arc<T> {
    fn drivers_near(
        &self,
        passenger: ParticipantId,
        pickup:    GeoPoint,
        radius_km: f64,
        limit:     usize,
    ) -> impl Future<Output = DispatchResult<Vec<ParticipantId>>> + Send {
        (**self).drivers_near(passenger, pickup, radius_km, limit)
    }
}
