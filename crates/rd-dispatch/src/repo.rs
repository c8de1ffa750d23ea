//! Trip persistence seam and the in-memory repository.

use std::collections::BTreeMap;
use std::future::{ready, Future};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rd_core::{GeoPoint, ParticipantId, Timestamp, TripId};

use crate::{DispatchError, DispatchResult, Trip, TripStatus};

/// The fields fixed at trip creation.  The repository assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrip {
    pub passenger_id:   ParticipantId,
    pub origin:         GeoPoint,
    pub destination:    GeoPoint,
    pub distance_km:    f64,
    pub fare:           f64,
    pub payment_method: String,
}

impl NewTrip {
    /// The REQUESTED record this becomes once stored under `id`.
    pub fn into_trip(self, id: TripId, now: Timestamp) -> Trip {
        Trip {
            id,
            passenger_id:   self.passenger_id,
            driver_id:      None,
            origin:         self.origin,
            destination:    self.destination,
            status:         TripStatus::Requested,
            distance_km:    self.distance_km,
            fare:           self.fare,
            payment_method: self.payment_method,
            rating:         None,
            comment:        None,
            created_at:     now,
            updated_at:     now,
            started_at:     None,
            completed_at:   None,
            cancelled_at:   None,
            cancelled_by:   None,
        }
    }
}

/// Durable trip storage.
///
/// [`update`](Self::update) is the only way to mutate a stored trip: the
/// closure runs against the current record and its result is written back
/// only if it returns `Ok`, as one atomic step.
pub trait TripRepository: Send + Sync {
    fn insert(
        &self,
        trip: NewTrip,
        now:  Timestamp,
    ) -> impl Future<Output = DispatchResult<Trip>> + Send;

    /// Fails with [`DispatchError::TripNotFound`] for unknown ids.
    fn get(&self, id: TripId) -> impl Future<Output = DispatchResult<Trip>> + Send;

    fn update<F>(&self, id: TripId, apply: F) -> impl Future<Output = DispatchResult<Trip>> + Send
    where
        F: FnOnce(&mut Trip) -> DispatchResult<()> + Send + 'static;

    /// Trips requested by `passenger`, ascending by id.
    fn list_by_passenger(
        &self,
        passenger: ParticipantId,
    ) -> impl Future<Output = DispatchResult<Vec<Trip>>> + Send;

    /// Trips accepted by `driver`, ascending by id.
    fn list_by_driver(
        &self,
        driver: ParticipantId,
    ) -> impl Future<Output = DispatchResult<Vec<Trip>>> + Send;

    /// Up to `limit` trips after skipping `offset`, ascending by id.
    fn list_page(
        &self,
        offset: usize,
        limit:  usize,
    ) -> impl Future<Output = DispatchResult<Vec<Trip>>> + Send;
}

// ── InMemoryTripRepository ────────────────────────────────────────────────────

/// Process-local repository.  Ids start at 1.
pub struct InMemoryTripRepository {
    trips:   RwLock<BTreeMap<TripId, Trip>>,
    next_id: AtomicU64,
}

impl Default for InMemoryTripRepository {
    fn default() -> Self {
        Self { trips: RwLock::new(BTreeMap::new()), next_id: AtomicU64::new(1) }
    }
}

impl InMemoryTripRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> DispatchResult<RwLockReadGuard<'_, BTreeMap<TripId, Trip>>> {
        self.trips
            .read()
            .map_err(|_| DispatchError::StorageUnavailable("trip table lock poisoned".into()))
    }

    fn write(&self) -> DispatchResult<RwLockWriteGuard<'_, BTreeMap<TripId, Trip>>> {
        self.trips
            .write()
            .map_err(|_| DispatchError::StorageUnavailable("trip table lock poisoned".into()))
    }

    fn insert_now(&self, trip: NewTrip, now: Timestamp) -> DispatchResult<Trip> {
        let id = TripId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let trip = trip.into_trip(id, now);
        self.write()?.insert(id, trip.clone());
        Ok(trip)
    }

    fn get_now(&self, id: TripId) -> DispatchResult<Trip> {
        self.read()?.get(&id).cloned().ok_or(DispatchError::TripNotFound(id))
    }

    fn update_now<F>(&self, id: TripId, apply: F) -> DispatchResult<Trip>
    where
        F: FnOnce(&mut Trip) -> DispatchResult<()>,
    {
        let mut trips = self.write()?;
        let stored = trips.get_mut(&id).ok_or(DispatchError::TripNotFound(id))?;
        let mut next = stored.clone();
        apply(&mut next)?;
        *stored = next.clone();
        Ok(next)
    }

    fn filtered(&self, keep: impl Fn(&Trip) -> bool) -> DispatchResult<Vec<Trip>> {
        Ok(self.read()?.values().filter(|t| keep(t)).cloned().collect())
    }

    fn page_now(&self, offset: usize, limit: usize) -> DispatchResult<Vec<Trip>> {
        Ok(self.read()?.values().skip(offset).take(limit).cloned().collect())
    }
}

impl TripRepository for InMemoryTripRepository {
    fn insert(
        &self,
        trip: NewTrip,
        now:  Timestamp,
    ) -> impl Future<Output = DispatchResult<Trip>> + Send {
        ready(self.insert_now(trip, now))
    }

    fn get(&self, id: TripId) -> impl Future<Output = DispatchResult<Trip>> + Send {
        ready(self.get_now(id))
    }

    fn update<F>(&self, id: TripId, apply: F) -> impl Future<Output = DispatchResult<Trip>> + Send
    where
        F: FnOnce(&mut Trip) -> DispatchResult<()> + Send + 'static,
    {
        ready(self.update_now(id, apply))
    }

    fn list_by_passenger(
        &self,
        passenger: ParticipantId,
    ) -> impl Future<Output = DispatchResult<Vec<Trip>>> + Send {
        ready(self.filtered(|t| t.passenger_id == passenger))
    }

    fn list_by_driver(
        &self,
        driver: ParticipantId,
    ) -> impl Future<Output = DispatchResult<Vec<Trip>>> + Send {
        ready(self.filtered(|t| t.driver_id == Some(driver)))
    }

    fn list_page(
        &self,
        offset: usize,
        limit:  usize,
    ) -> impl Future<Output = DispatchResult<Vec<Trip>>> + Send {
        ready(self.page_now(offset, limit))
    }
}
