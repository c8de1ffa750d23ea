//! `DispatchEngine`: trip creation, candidate acquisition and the
//! accept/reject/status/cancel/review protocol.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;

use rd_core::{Clock, GeoPoint, ParticipantId, TripId};
use rd_route::{FareSchedule, RouteOracle, RouteSummary};

use crate::{
    CandidateBook, CandidateQueue, DispatchConfig, DispatchError, DispatchResult, DriverLocator,
    EventSink, NewTrip, Review, Trip, TripEvent, TripRepository, TripStatus,
};

/// A passenger's request for a ride.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRequest {
    pub passenger_id:   ParticipantId,
    pub origin:         GeoPoint,
    pub destination:    GeoPoint,
    pub payment_method: String,
}

/// Result of [`DispatchEngine::create_trip`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedTrip {
    pub trip:       Trip,
    pub route:      RouteSummary,
    /// Drivers queued for the trip at creation.  Zero is not an error.
    pub candidates: usize,
}

/// Result of [`DispatchEngine::reject_trip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectOutcome {
    pub rejected:    ParticipantId,
    /// The driver now on offer, if any remain.
    pub next_driver: Option<ParticipantId>,
}

/// The dispatch orchestrator.
///
/// Generic over its three collaborators so tests and deployments can swap
/// each independently:
///
/// | Parameter | Trait             | Typical implementation             |
/// |-----------|-------------------|------------------------------------|
/// | `O`       | `RouteOracle`     | a maps client, `StraightLineOracle` |
/// | `L`       | `DriverLocator`   | `Arc<PresenceStore>`               |
/// | `R`       | `TripRepository`  | `InMemoryTripRepository`, SQLite   |
///
/// Construct with [`DispatchEngineBuilder`][crate::DispatchEngineBuilder].
pub struct DispatchEngine<O, L, R>
where
    O: RouteOracle,
    L: DriverLocator,
    R: TripRepository,
{
    pub(crate) config:  DispatchConfig,
    pub(crate) fares:   FareSchedule,
    pub(crate) oracle:  O,
    pub(crate) locator: L,
    pub(crate) repo:    R,
    pub(crate) book:    CandidateBook,
    pub(crate) events:  Arc<dyn EventSink>,
    pub(crate) clock:   Arc<dyn Clock>,
}

impl<O, L, R> DispatchEngine<O, L, R>
where
    O: RouteOracle,
    L: DriverLocator,
    R: TripRepository,
{
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    // ── Creation and acquisition ──────────────────────────────────────────

    /// Price the route, persist a REQUESTED trip and queue nearby drivers.
    ///
    /// Only an oracle or storage failure fails creation.  Finding no drivers,
    /// or failing to search for them, leaves the trip with an empty queue.
    pub async fn create_trip(&self, req: TripRequest) -> DispatchResult<CreatedTrip> {
        req.origin.validate()?;
        req.destination.validate()?;

        let estimate = match timeout(
            self.config.oracle_timeout,
            self.oracle.route(req.origin, req.destination),
        )
        .await
        {
            Ok(r) => r?,
            Err(_) => {
                log::warn!(
                    "[DISPATCH] Route oracle timed out after {:?} for passenger {}",
                    self.config.oracle_timeout,
                    req.passenger_id
                );
                return Err(DispatchError::RouteUnavailable(format!(
                    "timed out after {:?}",
                    self.config.oracle_timeout
                )));
            }
        };
        let route = self.fares.price(estimate);

        let new_trip = NewTrip {
            passenger_id:   req.passenger_id,
            origin:         req.origin,
            destination:    req.destination,
            distance_km:    route.distance_km(),
            fare:           route.fare,
            payment_method: req.payment_method,
        };
        let trip = self.storage(self.repo.insert(new_trip, self.clock.now())).await?;
        log::info!(
            "[DISPATCH] Trip {} created for passenger {}: {:.2} km, fare {:.2}, ~{} s",
            trip.id,
            trip.passenger_id,
            route.distance_km(),
            route.fare,
            route.duration_whole_secs()
        );

        let candidates = {
            let mut queue = self.book.lock(trip.id).await;
            match self.acquire(&trip).await {
                Ok(drivers) => queue.replace(drivers),
                Err(e) => {
                    log::warn!("[DISPATCH] Candidate search failed for trip {}: {e}", trip.id);
                    0
                }
            }
        };

        self.publish(TripEvent::Created {
            trip:          trip.clone(),
            duration_secs: route.duration_whole_secs(),
            candidates,
        });
        Ok(CreatedTrip { trip, route, candidates })
    }

    /// Escalating-radius search: the first radius with any driver wins.
    async fn acquire(&self, trip: &Trip) -> DispatchResult<Vec<ParticipantId>> {
        for &radius_km in &self.config.search_radii_km {
            let lookup = self.locator.drivers_near(
                trip.passenger_id,
                trip.origin,
                radius_km,
                self.config.candidates_per_radius,
            );
            let drivers = match timeout(self.config.locator_timeout, lookup).await {
                Ok(r) => r?,
                Err(_) => {
                    return Err(DispatchError::StorageUnavailable(format!(
                        "proximity query at {radius_km} km timed out after {:?}",
                        self.config.locator_timeout
                    )));
                }
            };
            if !drivers.is_empty() {
                log::info!(
                    "[DISPATCH] Found {} candidate driver(s) within {radius_km} km for trip {}",
                    drivers.len(),
                    trip.id
                );
                return Ok(drivers);
            }
        }
        log::info!(
            "[DISPATCH] No drivers within {} km for trip {}",
            self.config.search_radii_km.last().copied().unwrap_or_default(),
            trip.id
        );
        Ok(Vec::new())
    }

    /// The queue head, re-running acquisition once if the queue is empty.
    async fn head_or_reacquire(
        &self,
        trip:  &Trip,
        queue: &mut CandidateQueue,
    ) -> DispatchResult<ParticipantId> {
        if let Some(head) = queue.head() {
            return Ok(head);
        }
        log::debug!("[DISPATCH] Re-acquiring candidates for trip {}", trip.id);
        queue.replace(self.acquire(trip).await?);
        queue.head().ok_or(DispatchError::NoDriversAvailable(trip.id))
    }

    /// The driver currently on offer for `trip_id`.  Does not consume it.
    pub async fn suggested_driver(&self, trip_id: TripId) -> DispatchResult<ParticipantId> {
        let (mut queue, trip) = self
            .open(trip_id, |t| t.require_requested("suggest a driver for"))
            .await?;
        self.head_or_reacquire(&trip, &mut queue).await
    }

    /// Snapshot of `trip_id`'s queue, head first.
    pub async fn candidates(&self, trip_id: TripId) -> Vec<ParticipantId> {
        self.book.snapshot(trip_id).await
    }

    // ── Driver responses ──────────────────────────────────────────────────

    /// Assign `driver` if and only if they are the suggested driver.
    pub async fn accept_trip(&self, driver: ParticipantId, trip_id: TripId) -> DispatchResult<Trip> {
        let (mut queue, trip) = self.open(trip_id, |t| t.require_requested("accept")).await?;

        let head = self.head_or_reacquire(&trip, &mut queue).await?;
        if head != driver {
            log::warn!(
                "[DISPATCH] Driver {driver} tried to accept trip {trip_id} out of turn (suggested {head})"
            );
            return Err(DispatchError::NotSuggested { trip: trip_id, driver });
        }

        let now = self.clock.now();
        let trip = self
            .storage(self.repo.update(trip_id, move |t| t.accept(driver, now)))
            .await?;
        queue.clear();
        drop(queue);
        self.book.discard(trip_id);

        log::info!("[DISPATCH] Driver {driver} accepted trip {trip_id}");
        self.publish(TripEvent::Accepted { trip: trip.clone() });
        Ok(trip)
    }

    /// Decline on behalf of the suggested driver and move to the next one.
    pub async fn reject_trip(
        &self,
        passenger: ParticipantId,
        driver:    ParticipantId,
        trip_id:   TripId,
    ) -> DispatchResult<RejectOutcome> {
        let (mut queue, _trip) = self
            .open(trip_id, |t| {
                if t.passenger_id != passenger {
                    log::warn!("[DISPATCH] Reject of trip {trip_id} with mismatched passenger {passenger}");
                    return Err(DispatchError::Unauthorized { user: passenger, trip: trip_id });
                }
                t.require_requested("reject")
            })
            .await?;

        match queue.head() {
            None => return Err(DispatchError::NoMoreDrivers(trip_id)),
            Some(head) if head != driver => {
                return Err(DispatchError::NotSuggested { trip: trip_id, driver });
            }
            Some(_) => {}
        }
        queue.pop_head();
        let next_driver = queue.head();
        drop(queue);

        match next_driver {
            Some(next) => log::info!("[DISPATCH] Driver {driver} rejected trip {trip_id}; next is {next}"),
            None       => log::info!("[DISPATCH] Driver {driver} rejected trip {trip_id}; queue exhausted"),
        }
        self.publish(TripEvent::Rejected {
            trip_id,
            passenger_id: passenger,
            driver_id: driver,
            next_driver,
        });
        Ok(RejectOutcome { rejected: driver, next_driver })
    }

    /// Driver-initiated ACCEPTED → STARTED or STARTED → COMPLETED.
    pub async fn update_status(
        &self,
        trip_id: TripId,
        driver:  ParticipantId,
        next:    TripStatus,
    ) -> DispatchResult<Trip> {
        let now = self.clock.now();
        let trip = self
            .storage(self.repo.update(trip_id, move |t| t.advance(driver, next, now)))
            .await?;
        log::info!("[DISPATCH] Trip {trip_id} is now {}", trip.status);
        self.publish(TripEvent::StatusUpdated { trip: trip.clone() });
        Ok(trip)
    }

    /// Cancel on behalf of the passenger or the assigned driver.
    pub async fn cancel_trip(&self, trip_id: TripId, user: ParticipantId) -> DispatchResult<Trip> {
        let mut queue = self.book.lock(trip_id).await;
        let now = self.clock.now();
        let cancelled = self
            .storage(self.repo.update(trip_id, move |t| t.cancel(user, now)))
            .await;
        let trip = match cancelled {
            Ok(trip) => trip,
            Err(e) => {
                drop(queue);
                self.settle(trip_id, &e);
                return Err(e);
            }
        };
        queue.clear();
        drop(queue);
        self.book.discard(trip_id);

        log::info!("[DISPATCH] Trip {trip_id} cancelled by {user}");
        self.publish(TripEvent::Cancelled { trip: trip.clone() });
        Ok(trip)
    }

    // ── Reviews ───────────────────────────────────────────────────────────

    pub async fn submit_review(
        &self,
        trip_id: TripId,
        user:    ParticipantId,
        rating:  u8,
        comment: String,
    ) -> DispatchResult<Trip> {
        let policy = self.config.review_policy();
        let now = self.clock.now();
        let trip = self
            .storage(self.repo.update(trip_id, move |t| t.review(user, rating, comment, policy, now)))
            .await?;
        log::info!("[DISPATCH] Trip {trip_id} reviewed by {user}: {rating}/5");
        self.publish(TripEvent::Reviewed { trip: trip.clone() });
        Ok(trip)
    }

    pub async fn review(&self, trip_id: TripId, user: ParticipantId) -> DispatchResult<Review> {
        self.load(trip_id).await?.review_for(user)
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// Trip detail, visible only to its passenger and assigned driver.
    pub async fn trip(&self, trip_id: TripId, requester: ParticipantId) -> DispatchResult<Trip> {
        let trip = self.load(trip_id).await?;
        if let Err(e) = trip.authorize_read(requester) {
            log::warn!("[DISPATCH] Participant {requester} denied read of trip {trip_id}");
            return Err(e);
        }
        Ok(trip)
    }

    pub async fn trips_by_passenger(&self, passenger: ParticipantId) -> DispatchResult<Vec<Trip>> {
        let trips = self.storage(self.repo.list_by_passenger(passenger)).await?;
        self.publish(TripEvent::PassengerHistory { passenger_id: passenger, trips: trips.len() });
        Ok(trips)
    }

    pub async fn trips_by_driver(&self, driver: ParticipantId) -> DispatchResult<Vec<Trip>> {
        let trips = self.storage(self.repo.list_by_driver(driver)).await?;
        self.publish(TripEvent::DriverHistory { driver_id: driver, trips: trips.len() });
        Ok(trips)
    }

    /// One page of every trip, ordered by id.  `page` is 1-based.
    pub async fn all_trips(&self, page: usize, limit: usize) -> DispatchResult<Vec<Trip>> {
        if page == 0 || limit == 0 {
            return Err(DispatchError::InvalidRequest(format!(
                "page and limit must be at least 1, got page={page} limit={limit}"
            )));
        }
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| DispatchError::InvalidRequest(format!("page {page} is out of range")))?;
        self.storage(self.repo.list_page(offset, limit)).await
    }

    // ── Internals ─────────────────────────────────────────────────────────

    /// Lock `trip_id`'s queue, load the trip and run `check` on it.
    async fn open<C>(
        &self,
        trip_id: TripId,
        check:   C,
    ) -> DispatchResult<(OwnedMutexGuard<CandidateQueue>, Trip)>
    where
        C: FnOnce(&Trip) -> DispatchResult<()>,
    {
        let queue = self.book.lock(trip_id).await;
        match self.load(trip_id).await.and_then(|t| check(&t).map(|()| t)) {
            Ok(trip) => Ok((queue, trip)),
            Err(e) => {
                drop(queue);
                self.settle(trip_id, &e);
                Err(e)
            }
        }
    }

    /// After a failed queue operation, give the slot back if the trip is
    /// missing or no longer REQUESTED.  The guard must already be dropped.
    fn settle(&self, trip_id: TripId, err: &DispatchError) {
        if matches!(err, DispatchError::TripNotFound(_) | DispatchError::InvalidState { .. }) {
            self.book.release(trip_id);
        }
    }

    async fn load(&self, trip_id: TripId) -> DispatchResult<Trip> {
        self.storage(self.repo.get(trip_id)).await
    }

    /// Run a repository call under the storage deadline.
    ///
    /// On expiry the call's future is dropped.  Repositories that finish the
    /// work elsewhere must not commit it afterwards; see
    /// `SqliteTripRepository`.
    async fn storage<T, F>(&self, call: F) -> DispatchResult<T>
    where
        F: Future<Output = DispatchResult<T>>,
    {
        bounded(self.config.storage_timeout, "trip storage", call).await
    }

    fn publish(&self, event: TripEvent) {
        if let Err(e) = self.events.publish(&event) {
            log::warn!("[DISPATCH] Dropped {} event: {e}", event.name());
        }
    }
}

async fn bounded<T, F>(deadline: Duration, what: &str, call: F) -> DispatchResult<T>
where
    F: Future<Output = DispatchResult<T>>,
{
    match timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::StorageUnavailable(format!(
            "{what} timed out after {deadline:?}"
        ))),
    }
}
