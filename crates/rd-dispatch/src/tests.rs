//! Unit and scenario tests for rd-dispatch.

#[cfg(test)]
mod helpers {
    use std::future::{ready, Future};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use rd_core::{GeoPoint, ManualClock, ParticipantId, Role};
    use rd_presence::{PositionUpdate, PresenceConfig, PresenceStore};
    use rd_route::{RouteError, RouteEstimate, RouteOracle, RouteResult, StraightLineOracle};

    use crate::{
        DispatchConfig, DispatchEngine, DispatchEngineBuilder, DispatchError, DispatchResult,
        DriverLocator, EventSink, InMemoryTripRepository, PublishError, TripEvent, TripRequest,
    };

    pub type TestEngine = DispatchEngine<StraightLineOracle, Arc<PresenceStore>, InMemoryTripRepository>;

    pub struct World {
        pub engine:   Arc<TestEngine>,
        pub presence: Arc<PresenceStore>,
        pub clock:    Arc<ManualClock>,
        pub events:   Arc<RecordingSink>,
    }

    pub fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    pub fn world() -> World {
        world_with(DispatchConfig::default())
    }

    pub fn world_with(config: DispatchConfig) -> World {
        init_logging();
        let clock = Arc::new(ManualClock::at_unix_secs(1_700_000_000));
        let presence = Arc::new(
            PresenceStore::with_clock(PresenceConfig::default(), clock.clone()).unwrap(),
        );
        let events = Arc::new(RecordingSink::default());
        let engine = DispatchEngineBuilder::new(
            StraightLineOracle::default(),
            presence.clone(),
            InMemoryTripRepository::new(),
        )
        .config(config)
        .events(events.clone())
        .clock(clock.clone())
        .build()
        .unwrap();
        World { engine: Arc::new(engine), presence, clock, events }
    }

    /// An engine with custom oracle/locator over a fresh in-memory repository.
    pub fn engine_with<O, L>(oracle: O, locator: L, config: DispatchConfig) -> DispatchEngine<O, L, InMemoryTripRepository>
    where
        O: RouteOracle,
        L: DriverLocator,
    {
        init_logging();
        DispatchEngineBuilder::new(oracle, locator, InMemoryTripRepository::new())
            .config(config)
            .clock(Arc::new(ManualClock::at_unix_secs(1_700_000_000)))
            .build()
            .unwrap()
    }

    pub fn place(world: &World, id: u32, role: Role, lat: f64, lon: f64) {
        world
            .presence
            .set_position(PositionUpdate::new(ParticipantId(id), role, lat, lon))
            .unwrap();
    }

    pub fn request(passenger: u32, origin: (f64, f64), dest: (f64, f64)) -> TripRequest {
        TripRequest {
            passenger_id:   ParticipantId(passenger),
            origin:         GeoPoint::new(origin.0, origin.1),
            destination:    GeoPoint::new(dest.0, dest.1),
            payment_method: "cash".into(),
        }
    }

    /// Passenger 1 at (10.0, 106.0); driver 7 ~1.5 km away; driver 9 ~75 km away.
    pub fn scenario() -> World {
        let w = world();
        place(&w, 1, Role::Passenger, 10.0, 106.0);
        place(&w, 7, Role::Driver, 10.01, 106.01);
        place(&w, 9, Role::Driver, 10.5, 106.5);
        w
    }

    pub fn scenario_request() -> TripRequest {
        request(1, (10.0, 106.0), (10.2, 106.2))
    }

    // ── Doubles ───────────────────────────────────────────────────────────

    #[derive(Default)]
    pub struct RecordingSink {
        names: Mutex<Vec<&'static str>>,
    }

    impl RecordingSink {
        pub fn names(&self) -> Vec<&'static str> {
            self.names.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn publish(&self, event: &TripEvent) -> Result<(), PublishError> {
            self.names.lock().unwrap().push(event.name());
            Ok(())
        }
    }

    pub struct FailingSink;

    impl EventSink for FailingSink {
        fn publish(&self, _event: &TripEvent) -> Result<(), PublishError> {
            Err(PublishError("broker down".into()))
        }
    }

    pub struct SlowOracle(pub Duration);

    impl RouteOracle for SlowOracle {
        fn route(
            &self,
            _origin: GeoPoint,
            _dest:   GeoPoint,
        ) -> impl Future<Output = RouteResult<RouteEstimate>> + Send {
            let delay = self.0;
            async move {
                tokio::time::sleep(delay).await;
                Ok(RouteEstimate { distance_m: 1_000.0, duration_secs: 60.0 })
            }
        }
    }

    pub struct DownOracle;

    impl RouteOracle for DownOracle {
        fn route(
            &self,
            _origin: GeoPoint,
            _dest:   GeoPoint,
        ) -> impl Future<Output = RouteResult<RouteEstimate>> + Send {
            ready(Err(RouteError::Unavailable("503".into())))
        }
    }

    pub struct DownLocator;

    impl DriverLocator for DownLocator {
        fn drivers_near(
            &self,
            _passenger: ParticipantId,
            _pickup:    GeoPoint,
            _radius_km: f64,
            _limit:     usize,
        ) -> impl Future<Output = DispatchResult<Vec<ParticipantId>>> + Send {
            ready(Err(DispatchError::StorageUnavailable("geo index unreachable".into())))
        }
    }
}

// ── Trip state machine ────────────────────────────────────────────────────────

#[cfg(test)]
mod trip {
    use rd_core::{Clock, GeoPoint, ManualClock, ParticipantId, TripId};

    use crate::{DispatchError, NewTrip, ReviewPolicy, Trip, TripStatus};

    const PASSENGER: ParticipantId = ParticipantId(1);
    const DRIVER: ParticipantId = ParticipantId(7);

    fn requested() -> Trip {
        let now = ManualClock::at_unix_secs(1_000).now();
        NewTrip {
            passenger_id:   PASSENGER,
            origin:         GeoPoint::new(10.0, 106.0),
            destination:    GeoPoint::new(10.2, 106.2),
            distance_km:    40.0,
            fare:           200.0,
            payment_method: "card".into(),
        }
        .into_trip(TripId(1), now)
    }

    fn accepted() -> Trip {
        let mut t = requested();
        t.accept(DRIVER, t.created_at).unwrap();
        t
    }

    #[test]
    fn status_names_round_trip() {
        for s in [
            TripStatus::Requested,
            TripStatus::Accepted,
            TripStatus::Started,
            TripStatus::Completed,
            TripStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<TripStatus>().unwrap(), s);
        }
        assert_eq!("started".parse::<TripStatus>().unwrap(), TripStatus::Started);
        assert!("REJECTED".parse::<TripStatus>().is_err());
    }

    #[test]
    fn only_forward_driver_moves_are_allowed() {
        assert!(TripStatus::Accepted.can_advance_to(TripStatus::Started));
        assert!(TripStatus::Started.can_advance_to(TripStatus::Completed));
        assert!(!TripStatus::Accepted.can_advance_to(TripStatus::Completed));
        assert!(!TripStatus::Requested.can_advance_to(TripStatus::Accepted));
        assert!(!TripStatus::Completed.can_advance_to(TripStatus::Started));
        assert!(!TripStatus::Started.can_advance_to(TripStatus::Cancelled));
    }

    #[test]
    fn accept_assigns_driver_once() {
        let mut t = accepted();
        assert_eq!(t.status, TripStatus::Accepted);
        assert_eq!(t.driver_id, Some(DRIVER));

        let before = t.clone();
        let err = t.accept(ParticipantId(9), t.created_at).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidState { status: TripStatus::Accepted, .. }));
        assert_eq!(t, before);
    }

    #[test]
    fn advance_stamps_times_and_checks_driver() {
        let mut t = accepted();
        let now = t.created_at + chrono::TimeDelta::seconds(60);

        assert!(matches!(
            t.advance(ParticipantId(9), TripStatus::Started, now),
            Err(DispatchError::Unauthorized { .. })
        ));
        assert!(matches!(
            t.advance(DRIVER, TripStatus::Completed, now),
            Err(DispatchError::InvalidTransition { from: TripStatus::Accepted, to: TripStatus::Completed, .. })
        ));

        t.advance(DRIVER, TripStatus::Started, now).unwrap();
        assert_eq!(t.started_at, Some(now));
        t.advance(DRIVER, TripStatus::Completed, now).unwrap();
        assert_eq!(t.completed_at, Some(now));
        assert_eq!(t.updated_at, now);
    }

    #[test]
    fn cancel_is_for_participants_and_not_after_terminal() {
        let mut t = accepted();
        let now = t.created_at;
        assert!(matches!(t.cancel(ParticipantId(42), now), Err(DispatchError::Unauthorized { .. })));

        t.cancel(DRIVER, now).unwrap();
        assert_eq!(t.status, TripStatus::Cancelled);
        assert_eq!(t.cancelled_by, Some(DRIVER));
        assert_eq!(t.cancelled_at, Some(now));

        assert!(matches!(t.cancel(PASSENGER, now), Err(DispatchError::InvalidState { .. })));
    }

    #[test]
    fn review_validates_rating_and_author() {
        let mut t = requested();
        let now = t.created_at;
        let policy = ReviewPolicy::default();

        assert!(matches!(
            t.review(DRIVER, 5, "great".into(), policy, now),
            Err(DispatchError::Unauthorized { .. })
        ));
        for bad in [0u8, 6] {
            assert!(matches!(
                t.review(PASSENGER, bad, String::new(), policy, now),
                Err(DispatchError::InvalidRequest(_))
            ));
        }
        t.review(PASSENGER, 4, "ok".into(), policy, now).unwrap();
        assert_eq!(t.rating, Some(4));
    }

    #[test]
    fn review_overwrite_follows_policy() {
        let now = requested().created_at;

        // Permissive default: the second review replaces the first.
        let mut t = requested();
        t.review(PASSENGER, 2, "meh".into(), ReviewPolicy::default(), now).unwrap();
        t.review(PASSENGER, 5, "fixed".into(), ReviewPolicy::default(), now).unwrap();
        assert_eq!((t.rating, t.comment.as_deref()), (Some(5), Some("fixed")));

        let strict = ReviewPolicy { allow_overwrite: false, requires_completion: false };
        let mut t = requested();
        t.review(PASSENGER, 2, "meh".into(), strict, now).unwrap();
        assert!(matches!(
            t.review(PASSENGER, 5, "again".into(), strict, now),
            Err(DispatchError::InvalidState { .. })
        ));
        assert_eq!(t.rating, Some(2));
    }

    #[test]
    fn review_can_require_completion() {
        let policy = ReviewPolicy { allow_overwrite: true, requires_completion: true };
        let mut t = accepted();
        let now = t.created_at;
        assert!(matches!(
            t.review(PASSENGER, 5, String::new(), policy, now),
            Err(DispatchError::InvalidState { .. })
        ));
        t.advance(DRIVER, TripStatus::Started, now).unwrap();
        t.advance(DRIVER, TripStatus::Completed, now).unwrap();
        t.review(PASSENGER, 5, String::new(), policy, now).unwrap();
    }

    #[test]
    fn review_is_readable_by_passenger_only() {
        let mut t = accepted();
        assert_eq!(t.review_for(PASSENGER), Err(DispatchError::ReviewNotFound(TripId(1))));
        t.review(PASSENGER, 3, "fine".into(), ReviewPolicy::default(), t.created_at).unwrap();

        let r = t.review_for(PASSENGER).unwrap();
        assert_eq!((r.passenger_id, r.rating, r.comment.as_str()), (PASSENGER, 3, "fine"));
        assert!(matches!(t.review_for(DRIVER), Err(DispatchError::Unauthorized { .. })));
    }

    #[test]
    fn read_access_is_limited_to_participants() {
        let t = accepted();
        assert!(t.authorize_read(PASSENGER).is_ok());
        assert!(t.authorize_read(DRIVER).is_ok());
        assert!(t.authorize_read(ParticipantId(3)).is_err());
    }
}

// ── Candidate queue ───────────────────────────────────────────────────────────

#[cfg(test)]
mod queue {
    use std::sync::Arc;
    use std::time::Duration;

    use rd_core::{ParticipantId, TripId};

    use crate::{CandidateBook, CandidateQueue};

    fn ids(raw: &[u32]) -> Vec<ParticipantId> {
        raw.iter().copied().map(ParticipantId).collect()
    }

    #[test]
    fn replace_deduplicates_preserving_order() {
        let mut q = CandidateQueue::new();
        assert_eq!(q.replace(ids(&[7, 3, 7, 9, 3])), 3);
        assert_eq!(q.to_vec(), ids(&[7, 3, 9]));
        assert_eq!(q.head(), Some(ParticipantId(7)));
    }

    #[test]
    fn pop_consumes_head() {
        let mut q = CandidateQueue::new();
        q.replace(ids(&[1, 2]));
        assert_eq!(q.pop_head(), Some(ParticipantId(1)));
        assert_eq!(q.head(), Some(ParticipantId(2)));
        assert_eq!(q.pop_head(), Some(ParticipantId(2)));
        assert_eq!(q.pop_head(), None);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn book_serialises_per_trip() {
        let book = Arc::new(CandidateBook::new());
        let mut held = book.lock(TripId(1)).await;
        held.replace(ids(&[5]));

        // Another trip is not blocked.
        let other = tokio::time::timeout(Duration::from_millis(100), book.lock(TripId(2))).await;
        assert!(other.is_ok());

        // The same trip is.
        let same = tokio::time::timeout(Duration::from_millis(50), book.lock(TripId(1))).await;
        assert!(same.is_err());

        drop(held);
        assert_eq!(book.lock(TripId(1)).await.head(), Some(ParticipantId(5)));

        book.discard(TripId(1));
        assert!(book.lock(TripId(1)).await.is_empty());
    }

    #[tokio::test]
    async fn release_spares_contended_slots() {
        let book = Arc::new(CandidateBook::new());
        let held = book.lock(TripId(3)).await;

        book.release(TripId(3));
        assert_eq!(book.len(), 1);

        drop(held);
        book.release(TripId(3));
        assert!(book.is_empty());
    }

    #[tokio::test]
    async fn snapshot_does_not_create_slots() {
        let book = CandidateBook::new();
        assert!(book.snapshot(TripId(8)).await.is_empty());
        assert!(book.is_empty());

        book.lock(TripId(8)).await.replace(ids(&[4, 2]));
        assert_eq!(book.snapshot(TripId(8)).await, ids(&[4, 2]));
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod config {
    use std::time::Duration;

    use crate::DispatchConfig;

    #[test]
    fn defaults() {
        let c = DispatchConfig::default();
        assert_eq!(c.search_radii_km, vec![5.0, 10.0, 15.0]);
        assert_eq!(c.candidates_per_radius, 5);
        assert!(c.allow_review_overwrite);
        assert!(!c.review_requires_completion);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_bad_radii_and_limits() {
        let bad = [
            DispatchConfig { search_radii_km: vec![], ..Default::default() },
            DispatchConfig { search_radii_km: vec![10.0, 5.0], ..Default::default() },
            DispatchConfig { search_radii_km: vec![0.0, 5.0], ..Default::default() },
            DispatchConfig { candidates_per_radius: 0, ..Default::default() },
            DispatchConfig { oracle_timeout: Duration::ZERO, ..Default::default() },
        ];
        for c in bad {
            assert!(c.validate().is_err(), "{c:?}");
        }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod engine {
    use std::sync::Arc;
    use std::time::Duration;

    use rd_core::{ParticipantId, Role, TripId};
    use rd_route::StraightLineOracle;

    use super::helpers::*;
    use crate::{DispatchConfig, DispatchEngineBuilder, DispatchError, InMemoryTripRepository, TripStatus};

    const P1: ParticipantId = ParticipantId(1);
    const D7: ParticipantId = ParticipantId(7);
    const D9: ParticipantId = ParticipantId(9);

    #[tokio::test]
    async fn nearby_driver_is_suggested_and_accepts() {
        let w = scenario();
        let created = w.engine.create_trip(scenario_request()).await.unwrap();
        let trip = created.trip;

        assert_eq!(trip.status, TripStatus::Requested);
        assert_eq!(created.candidates, 1);
        assert_eq!(w.engine.candidates(trip.id).await, vec![D7]);
        assert!((trip.fare - 5.0 * trip.distance_km).abs() < 1e-9);
        assert!(created.route.duration_whole_secs() > 0);

        assert_eq!(w.engine.suggested_driver(trip.id).await.unwrap(), D7);
        // Peeking twice does not consume.
        assert_eq!(w.engine.suggested_driver(trip.id).await.unwrap(), D7);

        let accepted = w.engine.accept_trip(D7, trip.id).await.unwrap();
        assert_eq!(accepted.status, TripStatus::Accepted);
        assert_eq!(accepted.driver_id, Some(D7));
        assert!(w.engine.candidates(trip.id).await.is_empty());
    }

    #[tokio::test]
    async fn search_escalates_to_first_non_empty_radius() {
        let w = world();
        place(&w, 1, Role::Passenger, 10.0, 106.0);
        place(&w, 20, Role::Driver, 10.063, 106.0); // ~7 km
        place(&w, 21, Role::Driver, 10.11, 106.0); // ~12 km

        let created = w.engine.create_trip(request(1, (10.0, 106.0), (10.3, 106.0))).await.unwrap();
        assert_eq!(w.engine.candidates(created.trip.id).await, vec![ParticipantId(20)]);
    }

    #[tokio::test]
    async fn search_reaches_the_widest_radius() {
        let w = world();
        place(&w, 1, Role::Passenger, 10.0, 106.0);
        place(&w, 30, Role::Driver, 10.108, 106.0); // ~12.0 km
        place(&w, 31, Role::Driver, 10.12, 106.0); // ~13.3 km
        place(&w, 32, Role::Driver, 10.16, 106.0); // ~17.8 km

        let created = w.engine.create_trip(request(1, (10.0, 106.0), (10.3, 106.0))).await.unwrap();
        assert_eq!(created.candidates, 2);
        assert_eq!(
            w.engine.candidates(created.trip.id).await,
            vec![ParticipantId(30), ParticipantId(31)]
        );
    }

    #[tokio::test]
    async fn drivers_past_the_widest_radius_are_not_queued() {
        let w = world();
        place(&w, 1, Role::Passenger, 10.0, 106.0);
        place(&w, 33, Role::Driver, 10.14, 106.0); // ~15.6 km

        let created = w.engine.create_trip(request(1, (10.0, 106.0), (10.3, 106.0))).await.unwrap();
        assert_eq!(created.candidates, 0);
        assert_eq!(created.trip.status, TripStatus::Requested);
        assert!(w.engine.candidates(created.trip.id).await.is_empty());
    }

    #[tokio::test]
    async fn candidates_are_capped_per_radius_and_ordered() {
        let w = world();
        place(&w, 1, Role::Passenger, 10.0, 106.0);
        for i in 1..=8u32 {
            place(&w, 100 + i, Role::Driver, 10.0 + 0.003 * f64::from(i), 106.0);
        }
        let created = w.engine.create_trip(scenario_request()).await.unwrap();
        let queue = w.engine.candidates(created.trip.id).await;
        assert_eq!(queue, (101..=105).map(ParticipantId).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn no_drivers_still_creates_trip() {
        let w = world();
        place(&w, 1, Role::Passenger, 10.0, 106.0);
        place(&w, 9, Role::Driver, 10.5, 106.5);

        let created = w.engine.create_trip(scenario_request()).await.unwrap();
        assert_eq!(created.candidates, 0);
        assert_eq!(created.trip.status, TripStatus::Requested);
        assert_eq!(
            w.engine.suggested_driver(created.trip.id).await,
            Err(DispatchError::NoDriversAvailable(created.trip.id))
        );
        let stored = w.engine.trip(created.trip.id, P1).await.unwrap();
        assert_eq!(stored.status, TripStatus::Requested);
    }

    #[tokio::test]
    async fn empty_queue_heals_when_drivers_appear() {
        let w = world();
        place(&w, 1, Role::Passenger, 10.0, 106.0);
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;
        assert!(w.engine.suggested_driver(trip.id).await.is_err());

        place(&w, 7, Role::Driver, 10.01, 106.01);
        assert_eq!(w.engine.suggested_driver(trip.id).await.unwrap(), D7);
        assert_eq!(w.engine.candidates(trip.id).await, vec![D7]);
    }

    #[tokio::test]
    async fn search_centres_on_live_passenger_position() {
        let w = world();
        // Passenger has walked away from the pickup point they requested.
        place(&w, 1, Role::Passenger, 20.0, 100.0);
        place(&w, 30, Role::Driver, 20.01, 100.0);
        place(&w, 31, Role::Driver, 10.01, 106.0);

        let created = w.engine.create_trip(scenario_request()).await.unwrap();
        assert_eq!(w.engine.candidates(created.trip.id).await, vec![ParticipantId(30)]);
    }

    #[tokio::test]
    async fn search_falls_back_to_pickup_point() {
        let w = world();
        place(&w, 31, Role::Driver, 10.01, 106.0);

        let created = w.engine.create_trip(scenario_request()).await.unwrap();
        assert_eq!(w.engine.candidates(created.trip.id).await, vec![ParticipantId(31)]);
    }

    #[tokio::test]
    async fn out_of_turn_accept_is_refused() {
        let w = scenario();
        place(&w, 9, Role::Driver, 10.02, 106.0); // move 9 into range, behind 7
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;
        assert_eq!(w.engine.candidates(trip.id).await, vec![D7, D9]);

        assert_eq!(
            w.engine.accept_trip(D9, trip.id).await,
            Err(DispatchError::NotSuggested { trip: trip.id, driver: D9 })
        );
        assert_eq!(w.engine.trip(trip.id, P1).await.unwrap().status, TripStatus::Requested);
        assert_eq!(w.engine.suggested_driver(trip.id).await.unwrap(), D7);
    }

    #[tokio::test]
    async fn failed_queue_calls_leave_no_slots_behind() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;
        assert_eq!(w.engine.book.len(), 1);

        w.engine.accept_trip(D7, trip.id).await.unwrap();
        assert_eq!(w.engine.book.len(), 0);

        assert!(matches!(
            w.engine.suggested_driver(trip.id).await,
            Err(DispatchError::InvalidState { .. })
        ));
        assert!(w.engine.reject_trip(P1, D7, trip.id).await.is_err());
        assert!(w.engine.candidates(trip.id).await.is_empty());
        for raw in 1_000..1_100u64 {
            let missing = TripId(raw);
            assert_eq!(
                w.engine.suggested_driver(missing).await,
                Err(DispatchError::TripNotFound(missing))
            );
            assert!(w.engine.accept_trip(D7, missing).await.is_err());
            assert!(w.engine.cancel_trip(missing, P1).await.is_err());
        }
        assert_eq!(w.engine.book.len(), 0);
    }

    #[tokio::test]
    async fn second_accept_fails_with_invalid_state() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;
        w.engine.accept_trip(D7, trip.id).await.unwrap();

        let err = w.engine.accept_trip(D9, trip.id).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidState { status: TripStatus::Accepted, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn rejects_deplete_the_queue() {
        let w = world();
        place(&w, 1, Role::Passenger, 10.0, 106.0);
        for id in [11u32, 12, 13] {
            place(&w, id, Role::Driver, 10.0 + 0.005 * f64::from(id - 10), 106.0);
        }
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;

        let mut outcomes = Vec::new();
        for id in [11u32, 12, 13] {
            outcomes.push(w.engine.reject_trip(P1, ParticipantId(id), trip.id).await.unwrap());
        }
        assert_eq!(outcomes[0].next_driver, Some(ParticipantId(12)));
        assert_eq!(outcomes[2].next_driver, None);

        assert_eq!(
            w.engine.reject_trip(P1, ParticipantId(13), trip.id).await,
            Err(DispatchError::NoMoreDrivers(trip.id))
        );
        assert_eq!(w.engine.trip(trip.id, P1).await.unwrap().status, TripStatus::Requested);

        // The next suggestion re-acquires from the index.
        assert_eq!(w.engine.suggested_driver(trip.id).await.unwrap(), ParticipantId(11));
    }

    #[tokio::test]
    async fn reject_checks_passenger_and_head() {
        let w = scenario();
        place(&w, 9, Role::Driver, 10.02, 106.0);
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;

        assert!(matches!(
            w.engine.reject_trip(ParticipantId(2), D7, trip.id).await,
            Err(DispatchError::Unauthorized { .. })
        ));
        assert_eq!(
            w.engine.reject_trip(P1, D9, trip.id).await,
            Err(DispatchError::NotSuggested { trip: trip.id, driver: D9 })
        );
        assert_eq!(w.engine.candidates(trip.id).await, vec![D7, D9]);
    }

    #[tokio::test]
    async fn reject_after_accept_is_invalid_state() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;
        w.engine.accept_trip(D7, trip.id).await.unwrap();
        assert!(matches!(
            w.engine.reject_trip(P1, D7, trip.id).await,
            Err(DispatchError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn full_lifecycle_stamps_timestamps() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;
        w.engine.accept_trip(D7, trip.id).await.unwrap();

        w.clock.advance(Duration::from_secs(120));
        let started = w.engine.update_status(trip.id, D7, TripStatus::Started).await.unwrap();
        assert_eq!(started.started_at, Some(trip.created_at + chrono::TimeDelta::seconds(120)));

        w.clock.advance(Duration::from_secs(600));
        let done = w.engine.update_status(trip.id, D7, TripStatus::Completed).await.unwrap();
        assert_eq!(done.status, TripStatus::Completed);
        assert_eq!(done.completed_at, Some(done.updated_at));
        assert!(done.completed_at > done.started_at);
    }

    #[tokio::test]
    async fn status_updates_are_driver_only_and_forward_only() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;

        // Nobody is assigned yet.
        assert!(matches!(
            w.engine.update_status(trip.id, D7, TripStatus::Started).await,
            Err(DispatchError::Unauthorized { .. })
        ));
        w.engine.accept_trip(D7, trip.id).await.unwrap();
        assert!(matches!(
            w.engine.update_status(trip.id, D9, TripStatus::Started).await,
            Err(DispatchError::Unauthorized { .. })
        ));
        assert!(matches!(
            w.engine.update_status(trip.id, D7, TripStatus::Cancelled).await,
            Err(DispatchError::InvalidTransition { .. })
        ));
        assert!(matches!(
            w.engine.update_status(trip.id, D7, TripStatus::Requested).await,
            Err(DispatchError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn terminal_trips_never_change_status() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;
        w.engine.accept_trip(D7, trip.id).await.unwrap();
        w.engine.update_status(trip.id, D7, TripStatus::Started).await.unwrap();
        w.engine.update_status(trip.id, D7, TripStatus::Completed).await.unwrap();

        assert!(w.engine.cancel_trip(trip.id, P1).await.is_err());
        assert!(w.engine.accept_trip(D7, trip.id).await.is_err());
        assert!(w.engine.reject_trip(P1, D7, trip.id).await.is_err());
        assert!(w.engine.suggested_driver(trip.id).await.is_err());
        for s in [TripStatus::Requested, TripStatus::Accepted, TripStatus::Started, TripStatus::Cancelled] {
            assert!(w.engine.update_status(trip.id, D7, s).await.is_err());
        }
        assert_eq!(w.engine.trip(trip.id, P1).await.unwrap().status, TripStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_records_who_and_when() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;

        assert!(matches!(
            w.engine.cancel_trip(trip.id, D9).await,
            Err(DispatchError::Unauthorized { .. })
        ));
        let cancelled = w.engine.cancel_trip(trip.id, P1).await.unwrap();
        assert_eq!(cancelled.status, TripStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(P1));
        assert!(cancelled.cancelled_at.is_some());

        assert!(w.engine.candidates(trip.id).await.is_empty());
        assert!(matches!(
            w.engine.suggested_driver(trip.id).await,
            Err(DispatchError::InvalidState { status: TripStatus::Cancelled, .. })
        ));
        assert!(w.engine.cancel_trip(trip.id, P1).await.is_err());
    }

    #[tokio::test]
    async fn assigned_driver_may_cancel_started_trip() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;
        w.engine.accept_trip(D7, trip.id).await.unwrap();
        w.engine.update_status(trip.id, D7, TripStatus::Started).await.unwrap();

        let cancelled = w.engine.cancel_trip(trip.id, D7).await.unwrap();
        assert_eq!(cancelled.cancelled_by, Some(D7));
    }

    #[tokio::test]
    async fn reviews_follow_default_permissive_policy() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;

        assert_eq!(w.engine.review(trip.id, P1).await, Err(DispatchError::ReviewNotFound(trip.id)));
        w.engine.submit_review(trip.id, P1, 4, "smooth".into()).await.unwrap();
        // Overwrite is permitted by default.
        w.engine.submit_review(trip.id, P1, 5, "actually great".into()).await.unwrap();

        let review = w.engine.review(trip.id, P1).await.unwrap();
        assert_eq!((review.rating, review.comment.as_str()), (5, "actually great"));
        assert!(matches!(w.engine.review(trip.id, D7).await, Err(DispatchError::Unauthorized { .. })));
        assert!(matches!(
            w.engine.submit_review(trip.id, P1, 9, String::new()).await,
            Err(DispatchError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn strict_review_policy_refuses_second_review() {
        let config = DispatchConfig { allow_review_overwrite: false, ..Default::default() };
        let w = world_with(config);
        place(&w, 7, Role::Driver, 10.01, 106.01);
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;

        w.engine.submit_review(trip.id, P1, 3, "ok".into()).await.unwrap();
        assert!(matches!(
            w.engine.submit_review(trip.id, P1, 5, "again".into()).await,
            Err(DispatchError::InvalidState { .. })
        ));
        assert_eq!(w.engine.review(trip.id, P1).await.unwrap().rating, 3);
    }

    #[tokio::test]
    async fn trip_detail_is_private_to_participants() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;
        assert!(w.engine.trip(trip.id, P1).await.is_ok());
        assert!(matches!(w.engine.trip(trip.id, D7).await, Err(DispatchError::Unauthorized { .. })));

        w.engine.accept_trip(D7, trip.id).await.unwrap();
        assert!(w.engine.trip(trip.id, D7).await.is_ok());
        assert_eq!(
            w.engine.trip(TripId(999), P1).await,
            Err(DispatchError::TripNotFound(TripId(999)))
        );
    }

    #[tokio::test]
    async fn listings_and_pages() {
        let w = scenario();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(w.engine.create_trip(scenario_request()).await.unwrap().trip.id);
        }
        w.engine.accept_trip(D7, ids[0]).await.unwrap();
        w.engine.create_trip(request(2, (10.0, 106.0), (10.1, 106.1))).await.unwrap();

        assert_eq!(w.engine.trips_by_passenger(P1).await.unwrap().len(), 5);
        let driven = w.engine.trips_by_driver(D7).await.unwrap();
        assert_eq!(driven.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ids[0]]);

        let page2 = w.engine.all_trips(2, 2).await.unwrap();
        assert_eq!(page2.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ids[2], ids[3]]);
        assert_eq!(w.engine.all_trips(4, 2).await.unwrap().len(), 0);
        assert!(matches!(w.engine.all_trips(0, 2).await, Err(DispatchError::InvalidRequest(_))));
        assert!(matches!(w.engine.all_trips(1, 0).await, Err(DispatchError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn invalid_coordinates_are_rejected_before_routing() {
        let w = world();
        let err = w.engine.create_trip(request(1, (95.0, 0.0), (0.0, 0.0))).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert!(w.engine.all_trips(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn events_follow_lifecycle() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;
        w.engine.accept_trip(D7, trip.id).await.unwrap();
        w.engine.update_status(trip.id, D7, TripStatus::Started).await.unwrap();
        w.engine.cancel_trip(trip.id, P1).await.unwrap();
        w.engine.submit_review(trip.id, P1, 1, "cancelled on me".into()).await.unwrap();
        w.engine.trips_by_passenger(P1).await.unwrap();
        w.engine.trips_by_driver(D7).await.unwrap();

        assert_eq!(
            w.events.names(),
            vec![
                "user.createTrip",
                "driver.acceptTrip",
                "trip.updateStatus",
                "trip.cancel",
                "user.reviewTrip",
                "user.tripHistory",
                "driver.tripHistory",
            ]
        );
    }

    #[tokio::test]
    async fn failing_event_sink_does_not_fail_transitions() {
        let presence = Arc::new(
            rd_presence::PresenceStore::new(rd_presence::PresenceConfig::default()).unwrap(),
        );
        presence
            .set_position(rd_presence::PositionUpdate::new(D7, Role::Driver, 10.01, 106.01))
            .unwrap();
        let engine = DispatchEngineBuilder::new(
            StraightLineOracle::default(),
            presence,
            InMemoryTripRepository::new(),
        )
        .events(Arc::new(FailingSink))
        .build()
        .unwrap();

        let trip = engine.create_trip(scenario_request()).await.unwrap().trip;
        let accepted = engine.accept_trip(D7, trip.id).await.unwrap();
        assert_eq!(accepted.status, TripStatus::Accepted);
    }

    #[tokio::test]
    async fn slow_oracle_times_out_as_retryable() {
        let config = DispatchConfig { oracle_timeout: Duration::from_millis(50), ..Default::default() };
        let engine = engine_with(SlowOracle(Duration::from_secs(30)), DownLocator, config);

        let err = engine.create_trip(scenario_request()).await.unwrap_err();
        assert!(matches!(err, DispatchError::RouteUnavailable(_)));
        assert!(err.is_retryable());
        assert!(engine.all_trips(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oracle_failure_aborts_creation() {
        let engine = engine_with(DownOracle, DownLocator, DispatchConfig::default());
        let err = engine.create_trip(scenario_request()).await.unwrap_err();
        assert_eq!(err.kind(), "route_unavailable");
        assert!(engine.all_trips(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn locator_failure_is_tolerated_at_creation_only() {
        let engine = engine_with(StraightLineOracle::default(), DownLocator, DispatchConfig::default());
        let created = engine.create_trip(scenario_request()).await.unwrap();
        assert_eq!(created.candidates, 0);

        let err = engine.suggested_driver(created.trip.id).await.unwrap_err();
        assert!(matches!(err, DispatchError::StorageUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_assign_exactly_once() {
        let w = scenario();
        let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = w.engine.clone();
            handles.push(tokio::spawn(async move { engine.accept_trip(D7, trip.id).await }));
        }
        let mut wins = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(t) => {
                    wins += 1;
                    assert_eq!(t.driver_id, Some(D7));
                }
                Err(e) => assert!(matches!(e, DispatchError::InvalidState { .. }), "{e}"),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn accept_and_reject_race_leaves_consistent_state() {
        for _ in 0..20 {
            let w = scenario();
            place(&w, 9, Role::Driver, 10.02, 106.0);
            let trip = w.engine.create_trip(scenario_request()).await.unwrap().trip;

            let (a, r) = {
                let ea = w.engine.clone();
                let er = w.engine.clone();
                let accept = tokio::spawn(async move { ea.accept_trip(D7, trip.id).await });
                let reject = tokio::spawn(async move { er.reject_trip(P1, D7, trip.id).await });
                (accept.await.unwrap(), reject.await.unwrap())
            };
            assert!(a.is_ok() != r.is_ok(), "exactly one of accept/reject must win");

            let stored = w.engine.trip(trip.id, P1).await.unwrap();
            if a.is_ok() {
                assert_eq!(stored.status, TripStatus::Accepted);
            } else {
                assert_eq!(stored.status, TripStatus::Requested);
                assert_eq!(w.engine.candidates(trip.id).await, vec![D9]);
            }
        }
    }
}

// ── SQLite repository ─────────────────────────────────────────────────────────

#[cfg(all(test, feature = "sqlite"))]
mod sqlite_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use rd_core::{Clock, GeoPoint, ManualClock, ParticipantId, Role, TripId};
    use rd_presence::{PositionUpdate, PresenceConfig, PresenceStore};
    use rd_route::StraightLineOracle;

    use crate::{
        DispatchEngineBuilder, DispatchError, NewTrip, SqliteTripRepository, TripRepository,
        TripStatus,
    };

    fn tmp() -> TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    fn new_trip(passenger: u32) -> NewTrip {
        NewTrip {
            passenger_id:   ParticipantId(passenger),
            origin:         GeoPoint::new(10.0, 106.0),
            destination:    GeoPoint::new(10.2, 106.2),
            distance_km:    40.5,
            fare:           202.5,
            payment_method: "card".into(),
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let dir = tmp();
        let repo = SqliteTripRepository::open(&dir.path().join("trips.db")).unwrap();
        let now = ManualClock::at_unix_secs(1_700_000_000).now();

        let stored = repo.insert(new_trip(1), now).await.unwrap();
        assert_eq!(stored.id, TripId(1));
        assert_eq!(repo.get(stored.id).await.unwrap(), stored);
        assert!(dir.path().join("trips.db").exists());
        assert_eq!(repo.get(TripId(99)).await, Err(DispatchError::TripNotFound(TripId(99))));
    }

    #[tokio::test]
    async fn failed_update_leaves_row_untouched() {
        let repo = SqliteTripRepository::in_memory().unwrap();
        let now = ManualClock::at_unix_secs(1_700_000_000).now();
        let trip = repo.insert(new_trip(1), now).await.unwrap();

        let err = repo
            .update(trip.id, move |t| {
                t.driver_id = Some(ParticipantId(7));
                t.advance(ParticipantId(8), TripStatus::Started, now)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized { .. }));
        assert_eq!(repo.get(trip.id).await.unwrap(), trip);

        let accepted = repo.update(trip.id, move |t| t.accept(ParticipantId(7), now)).await.unwrap();
        assert_eq!(repo.get(trip.id).await.unwrap(), accepted);
        assert_eq!(repo.list_by_driver(ParticipantId(7)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_abandoned_at_deadline_rolls_back() {
        let repo = SqliteTripRepository::in_memory().unwrap();
        let now = ManualClock::at_unix_secs(1_700_000_000).now();
        let trip = repo.insert(new_trip(1), now).await.unwrap();

        let slow = repo.update(trip.id, move |t| {
            std::thread::sleep(Duration::from_millis(300));
            t.accept(ParticipantId(7), now)
        });
        assert!(tokio::time::timeout(Duration::from_millis(50), slow).await.is_err());

        // Queues behind the abandoned write on the connection lock.
        let stored = repo.get(trip.id).await.unwrap();
        assert_eq!(stored.status, TripStatus::Requested);
        assert_eq!(stored.driver_id, None);
    }

    #[tokio::test]
    async fn pages_are_ordered_by_id() {
        let repo = SqliteTripRepository::in_memory().unwrap();
        let now = ManualClock::at_unix_secs(1_700_000_000).now();
        for p in 1..=5 {
            repo.insert(new_trip(p), now).await.unwrap();
        }
        let page = repo.list_page(2, 2).await.unwrap();
        assert_eq!(page.iter().map(|t| t.id.0).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(repo.list_by_passenger(ParticipantId(5)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn engine_runs_on_sqlite() {
        let clock = Arc::new(ManualClock::at_unix_secs(1_700_000_000));
        let presence = Arc::new(PresenceStore::with_clock(PresenceConfig::default(), clock.clone()).unwrap());
        presence
            .set_position(PositionUpdate::new(ParticipantId(7), Role::Driver, 10.01, 106.01))
            .unwrap();
        let engine = DispatchEngineBuilder::new(
            StraightLineOracle::default(),
            presence,
            SqliteTripRepository::in_memory().unwrap(),
        )
        .clock(clock)
        .build()
        .unwrap();

        let req = crate::TripRequest {
            passenger_id:   ParticipantId(1),
            origin:         GeoPoint::new(10.0, 106.0),
            destination:    GeoPoint::new(10.2, 106.2),
            payment_method: "cash".into(),
        };
        let trip = engine.create_trip(req).await.unwrap().trip;
        engine.accept_trip(ParticipantId(7), trip.id).await.unwrap();
        engine.cancel_trip(trip.id, ParticipantId(1)).await.unwrap();

        let stored = engine.trip(trip.id, ParticipantId(1)).await.unwrap();
        assert_eq!(stored.status, TripStatus::Cancelled);
        assert_eq!(stored.cancelled_by, Some(ParticipantId(1)));
    }
}
