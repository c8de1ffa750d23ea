//! Dispatch service: trip creation, the accept/reject protocol, lifecycle
//! updates, reviews and listings.
//!
//! Role checks happen here, before the engine is touched; trip-level
//! authorization (is this caller the trip's passenger or driver?) is the
//! engine's job.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use rd_core::{GeoPoint, ParticipantId, Role, TripId};
use rd_dispatch::{
    DispatchEngine, DispatchError, DriverLocator, Review, Trip, TripRepository, TripRequest,
    TripStatus,
};
use rd_route::RouteOracle;

use crate::{Caller, CreateTripView, RejectView, Reply};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTripRequest {
    pub origin_lat:     f64,
    pub origin_lng:     f64,
    pub dest_lat:       f64,
    pub dest_lng:       f64,
    #[serde(default)]
    pub payment_method: String,
}

pub struct DispatchService<O, L, R>
where
    O: RouteOracle,
    L: DriverLocator,
    R: TripRepository,
{
    engine: Arc<DispatchEngine<O, L, R>>,
}

impl<O, L, R> Clone for DispatchService<O, L, R>
where
    O: RouteOracle,
    L: DriverLocator,
    R: TripRepository,
{
    fn clone(&self) -> Self {
        Self { engine: Arc::clone(&self.engine) }
    }
}

impl<O, L, R> DispatchService<O, L, R>
where
    O: RouteOracle,
    L: DriverLocator,
    R: TripRepository,
{
    pub fn new(engine: Arc<DispatchEngine<O, L, R>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<DispatchEngine<O, L, R>> {
        &self.engine
    }

    pub async fn create_trip(&self, caller: Caller, req: CreateTripRequest) -> Reply<CreateTripView> {
        log::info!("[DISPATCH] CreateTrip called by {caller}");
        if let Err(reply) = require(caller, Role::Passenger, "CreateTrip") {
            return reply;
        }
        let request = TripRequest {
            passenger_id:   caller.id,
            origin:         GeoPoint::new(req.origin_lat, req.origin_lng),
            destination:    GeoPoint::new(req.dest_lat, req.dest_lng),
            payment_method: req.payment_method,
        };
        let result = self.engine.create_trip(request).await.map(|created| CreateTripView {
            estimated_duration_seconds: created.route.duration_whole_secs(),
            trip:                       created.trip,
        });
        Reply::from_result(logged("CreateTrip", result), "Trip created successfully")
    }

    pub async fn accept_trip(&self, caller: Caller, trip_id: TripId) -> Reply<Trip> {
        log::info!("[DISPATCH] AcceptTrip called by {caller} for trip {trip_id}");
        if let Err(reply) = require(caller, Role::Driver, "AcceptTrip") {
            return reply;
        }
        let result = self.engine.accept_trip(caller.id, trip_id).await;
        Reply::from_result(logged("AcceptTrip", result), "Trip accepted successfully")
    }

    /// The suggested driver declines.  `passenger_id` must match the trip.
    pub async fn reject_trip(
        &self,
        caller:       Caller,
        passenger_id: ParticipantId,
        trip_id:      TripId,
    ) -> Reply<RejectView> {
        log::info!("[DISPATCH] RejectTrip called by {caller} for trip {trip_id}");
        if let Err(reply) = require(caller, Role::Driver, "RejectTrip") {
            return reply;
        }
        let result = self
            .engine
            .reject_trip(passenger_id, caller.id, trip_id)
            .await
            .map(|out| RejectView { rejected: out.rejected, next_driver: out.next_driver });
        Reply::from_result(logged("RejectTrip", result), "Trip rejected successfully")
    }

    pub async fn suggested_driver(&self, trip_id: TripId) -> Reply<ParticipantId> {
        let result = self.engine.suggested_driver(trip_id).await;
        Reply::from_result(logged("GetSuggestedDriver", result), "Suggested driver retrieved")
    }

    pub async fn trip_detail(&self, caller: Caller, trip_id: TripId) -> Reply<Trip> {
        log::info!("[DISPATCH] GetTripDetail called by {caller} for trip {trip_id}");
        let result = self.engine.trip(trip_id, caller.id).await;
        Reply::from_result(logged("GetTripDetail", result), "Trip retrieved successfully")
    }

    pub async fn trips_by_passenger(&self, caller: Caller) -> Reply<Vec<Trip>> {
        log::info!("[DISPATCH] GetTripsByPassenger called by {caller}");
        if let Err(reply) = require(caller, Role::Passenger, "GetTripsByPassenger") {
            return reply;
        }
        let result = self.engine.trips_by_passenger(caller.id).await;
        Reply::from_result(logged("GetTripsByPassenger", result), "Trips retrieved successfully")
    }

    pub async fn trips_by_driver(&self, caller: Caller) -> Reply<Vec<Trip>> {
        log::info!("[DISPATCH] GetTripsByDriver called by {caller}");
        if let Err(reply) = require(caller, Role::Driver, "GetTripsByDriver") {
            return reply;
        }
        let result = self.engine.trips_by_driver(caller.id).await;
        Reply::from_result(logged("GetTripsByDriver", result), "Trips retrieved successfully")
    }

    /// Administrative listing; `page` is 1-based.
    pub async fn all_trips(&self, page: usize, limit: usize) -> Reply<Vec<Trip>> {
        log::info!("[DISPATCH] GetTrips called: page {page}, limit {limit}");
        let result = self.engine.all_trips(page, limit).await;
        Reply::from_result(logged("GetTrips", result), "Trips retrieved successfully")
    }

    /// `status` is a status name, matched case-insensitively.
    pub async fn update_trip_status(&self, caller: Caller, trip_id: TripId, status: &str) -> Reply<Trip> {
        log::info!("[DISPATCH] UpdateTripStatus called by {caller} for trip {trip_id}: {status}");
        if let Err(reply) = require(caller, Role::Driver, "UpdateTripStatus") {
            return reply;
        }
        let next: TripStatus = match status.parse() {
            Ok(s) => s,
            Err(e) => return Reply::error(&DispatchError::from(e)),
        };
        let result = self.engine.update_status(trip_id, caller.id, next).await;
        Reply::from_result(logged("UpdateTripStatus", result), "Trip status updated successfully")
    }

    pub async fn cancel_trip(&self, caller: Caller, trip_id: TripId) -> Reply<Trip> {
        log::info!("[DISPATCH] CancelTrip called by {caller} for trip {trip_id}");
        let result = self.engine.cancel_trip(trip_id, caller.id).await;
        Reply::from_result(logged("CancelTrip", result), "Trip cancelled successfully")
    }

    pub async fn submit_review(
        &self,
        caller:  Caller,
        trip_id: TripId,
        rating:  i32,
        comment: String,
    ) -> Reply<Trip> {
        log::info!("[DISPATCH] ReviewTrip called by {caller} for trip {trip_id}");
        if let Err(reply) = require(caller, Role::Passenger, "ReviewTrip") {
            return reply;
        }
        let rating = match u8::try_from(rating) {
            Ok(r) => r,
            Err(_) => {
                let err = DispatchError::InvalidRequest(format!("rating must be 1..=5, got {rating}"));
                return Reply::error(&err);
            }
        };
        let result = self.engine.submit_review(trip_id, caller.id, rating, comment).await;
        Reply::from_result(logged("ReviewTrip", result), "Review submitted successfully")
    }

    pub async fn get_review(&self, caller: Caller, trip_id: TripId) -> Reply<Review> {
        log::info!("[DISPATCH] GetReview called by {caller} for trip {trip_id}");
        let result = self.engine.review(trip_id, caller.id).await;
        Reply::from_result(logged("GetReview", result), "Review retrieved successfully")
    }
}

fn require<T>(caller: Caller, role: Role, op: &str) -> Result<(), Reply<T>> {
    caller.require(role, op).map_err(|reason| {
        log::warn!("[DISPATCH] {reason}");
        Reply::fail("unauthorized", reason, false)
    })
}

fn logged<T>(op: &str, result: Result<T, DispatchError>) -> Result<T, DispatchError> {
    if let Err(e) = &result {
        if e.is_retryable() {
            log::error!("[DISPATCH] {op} failed: {e}");
        } else {
            log::warn!("[DISPATCH] {op} failed: {e}");
        }
    }
    result
}
