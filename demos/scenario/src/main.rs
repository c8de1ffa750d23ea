//! scenario: one ride end to end through the service layer.
//!
//! Scatters a fleet of drivers around a passenger, requests a trip, walks the
//! suggested-driver protocol (one rejection, then an acceptance) and drives
//! the trip to completion and review.  Every reply and every published event
//! is printed as JSON.
//!
//! Configuration comes from the `RD_*` environment variables; set
//! `RD_DB_PATH` to keep trips in an SQLite file instead of memory.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use rd_core::{ParticipantId, Role};
use rd_dispatch::{
    DispatchConfig, DispatchEngineBuilder, InMemoryTripRepository, SqliteTripRepository,
    TripRepository,
};
use rd_presence::{PresenceConfig, PresenceStore};
use rd_route::{FareSchedule, StraightLineOracle};
use rd_service::{
    Caller, ChannelEventSink, CreateTripRequest, DispatchService, PresenceService, Reply,
    SetPositionRequest,
};

// ── Constants ─────────────────────────────────────────────────────────────────

const DRIVER_COUNT:  u32 = 12;
const SEED:          u64 = 42;
const PASSENGER_ID:  u32 = 1;
const FIRST_DRIVER:  u32 = 100;
/// Passenger pickup, central Ho Chi Minh City.
const PICKUP:        (f64, f64) = (10.7769, 106.7009);
const DROPOFF:       (f64, f64) = (10.8231, 106.6297);
/// Drivers are scattered up to this many degrees from the pickup (~13 km).
const SCATTER_DEG:   f64 = 0.12;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let presence_config = PresenceConfig::from_env()?;
    let dispatch_config = DispatchConfig::from_env()?;
    let fares = FareSchedule::from_env()?;

    match std::env::var("RD_DB_PATH") {
        Ok(path) => {
            let repo = SqliteTripRepository::open(Path::new(&path))?;
            log::info!("Storing trips in {path}");
            run(repo, presence_config, dispatch_config, fares).await
        }
        Err(_) => run(InMemoryTripRepository::new(), presence_config, dispatch_config, fares).await,
    }
}

async fn run<R: TripRepository>(
    repo:            R,
    presence_config: PresenceConfig,
    dispatch_config: DispatchConfig,
    fares:           FareSchedule,
) -> Result<()> {
    let store = Arc::new(PresenceStore::new(presence_config)?);
    let (sink, mut events) = ChannelEventSink::channel();
    let engine = DispatchEngineBuilder::new(StraightLineOracle::default(), store.clone(), repo)
        .config(dispatch_config)
        .fares(fares)
        .events(Arc::new(sink))
        .build()?;

    let presence = PresenceService::new(store);
    let dispatch = DispatchService::new(Arc::new(engine));

    let printer = tokio::spawn(async move {
        while let Some(msg) = events.recv().await {
            match serde_json::to_string(&msg) {
                Ok(line) => println!("event  {line}"),
                Err(e)   => log::warn!("Unprintable event {}: {e}", msg.name),
            }
        }
    });

    // ── Fleet ─────────────────────────────────────────────────────────────

    let mut rng = SmallRng::seed_from_u64(SEED);
    for i in 0..DRIVER_COUNT {
        let lat = PICKUP.0 + rng.gen_range(-SCATTER_DEG..SCATTER_DEG);
        let lon = PICKUP.1 + rng.gen_range(-SCATTER_DEG..SCATTER_DEG);
        let reply = presence.set_position(position(FIRST_DRIVER + i, Role::Driver, lat, lon));
        expect_success("SetPosition", &reply)?;
    }
    show("SetPosition", &presence.set_position(position(PASSENGER_ID, Role::Passenger, PICKUP.0, PICKUP.1)))?;
    show("FindNearest", &presence.find_nearest(ParticipantId(PASSENGER_ID), 5, 0.0))?;
    show("ListAll", &presence.list_all().map(|all| all.total_count))?;

    // ── Ride ──────────────────────────────────────────────────────────────

    let passenger = Caller::passenger(PASSENGER_ID);
    let created = dispatch
        .create_trip(passenger, CreateTripRequest {
            origin_lat:     PICKUP.0,
            origin_lng:     PICKUP.1,
            dest_lat:       DROPOFF.0,
            dest_lng:       DROPOFF.1,
            payment_method: "cash".into(),
        })
        .await;
    show("CreateTrip", &created)?;
    let Some(trip_id) = created.data.map(|v| v.trip.id) else {
        bail!("trip creation returned no trip");
    };

    let first = dispatch.suggested_driver(trip_id).await;
    show("GetSuggestedDriver", &first)?;
    let Some(first) = first.data else {
        bail!("no driver within reach of the pickup");
    };

    let rejected = dispatch
        .reject_trip(Caller { id: first, role: Role::Driver }, ParticipantId(PASSENGER_ID), trip_id)
        .await;
    show("RejectTrip", &rejected)?;

    let driver = match rejected.data.and_then(|r| r.next_driver) {
        Some(next) => next,
        None => {
            // The queue ran dry; asking again re-runs the search.
            let again = dispatch.suggested_driver(trip_id).await;
            show("GetSuggestedDriver", &again)?;
            match again.data {
                Some(d) => d,
                None    => bail!("no driver left to accept trip {trip_id}"),
            }
        }
    };
    let driver = Caller { id: driver, role: Role::Driver };

    show("AcceptTrip", &dispatch.accept_trip(driver, trip_id).await)?;
    show("UpdateTripStatus", &dispatch.update_trip_status(driver, trip_id, "STARTED").await)?;
    show("UpdateTripStatus", &dispatch.update_trip_status(driver, trip_id, "COMPLETED").await)?;
    show("ReviewTrip", &dispatch.submit_review(passenger, trip_id, 5, "Smooth ride".into()).await)?;
    show("GetReview", &dispatch.get_review(passenger, trip_id).await)?;
    show("GetTripsByDriver", &dispatch.trips_by_driver(driver).await.map(|t| t.len()))?;
    show("GetTrips", &dispatch.all_trips(1, 10).await.map(|t| t.len()))?;

    drop(dispatch);
    printer.await?;
    Ok(())
}

fn position(id: u32, role: Role, lat: f64, lon: f64) -> SetPositionRequest {
    SetPositionRequest {
        participant_id: ParticipantId(id),
        role,
        latitude:       lat,
        longitude:      lon,
        speed:          0.0,
        heading:        String::new(),
        captured_at:    None,
    }
}

fn expect_success<T>(op: &str, reply: &Reply<T>) -> Result<()> {
    if !reply.success {
        bail!("{op} failed: {}", reply.message);
    }
    Ok(())
}

fn show<T: Serialize>(op: &str, reply: &Reply<T>) -> Result<()> {
    println!("{op:<18} {}", serde_json::to_string(reply)?);
    expect_success(op, reply)
}
