//! SQLite trip repository (feature `sqlite`).
//!
//! One `trips` table keyed by an autoincrement integer id.  Timestamps are
//! stored as Unix milliseconds; status as its upper-case name.  Every call
//! runs on tokio's blocking pool, and every write is one transaction so a
//! rejected transition never reaches disk.
//!
//! A caller that stops waiting (the engine's storage deadline) marks the
//! call abandoned; a write that has not committed yet then rolls back.  The
//! check runs just before `COMMIT`, so a deadline expiring during the commit
//! itself can still report `StorageUnavailable` for a write that landed.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::DateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use rd_core::{GeoPoint, ParticipantId, Timestamp, TripId};

use crate::{DispatchError, DispatchResult, NewTrip, Trip, TripRepository};

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous  = NORMAL;
    CREATE TABLE IF NOT EXISTS trips (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        passenger_id   INTEGER NOT NULL,
        driver_id      INTEGER,
        origin_lat     REAL    NOT NULL,
        origin_lng     REAL    NOT NULL,
        dest_lat       REAL    NOT NULL,
        dest_lng       REAL    NOT NULL,
        status         TEXT    NOT NULL,
        distance_km    REAL    NOT NULL,
        fare           REAL    NOT NULL,
        payment_method TEXT    NOT NULL,
        rating         INTEGER,
        comment        TEXT,
        created_at     INTEGER NOT NULL,
        updated_at     INTEGER NOT NULL,
        started_at     INTEGER,
        completed_at   INTEGER,
        cancelled_at   INTEGER,
        cancelled_by   INTEGER
    );
    CREATE INDEX IF NOT EXISTS trips_passenger ON trips (passenger_id);
    CREATE INDEX IF NOT EXISTS trips_driver    ON trips (driver_id);";

const COLUMNS: &str = "id, passenger_id, driver_id, origin_lat, origin_lng, dest_lat, dest_lng, \
     status, distance_km, fare, payment_method, rating, comment, created_at, updated_at, \
     started_at, completed_at, cancelled_at, cancelled_by";

impl From<rusqlite::Error> for DispatchError {
    fn from(e: rusqlite::Error) -> Self {
        DispatchError::StorageUnavailable(format!("sqlite: {e}"))
    }
}

/// Trip storage in an SQLite database file.
#[derive(Clone)]
pub struct SqliteTripRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTripRepository {
    /// Open (or create) the database at `path` and initialise the schema.
    pub fn open(path: &Path) -> DispatchResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// A private in-memory database.
    pub fn in_memory() -> DispatchResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> DispatchResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// Dropping the returned future before it resolves flags the call as
    /// abandoned; `f` sees the flag through [`Abandon::check`].
    async fn run<T, F>(&self, f: F) -> DispatchResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &Abandon) -> DispatchResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let abandon = Abandon::default();
        let mut watch = AbandonOnDrop { flag: abandon.clone(), armed: true };
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| DispatchError::StorageUnavailable("sqlite connection lock poisoned".into()))?;
            f(&mut *guard, &abandon)
        })
        .await
        .map_err(|e| DispatchError::StorageUnavailable(format!("sqlite worker failed: {e}")))?;
        watch.armed = false;
        result
    }
}

/// Set once the caller of a blocking call has gone away.
#[derive(Clone, Default)]
struct Abandon(Arc<AtomicBool>);

impl Abandon {
    /// `Err` if nobody is waiting for the result any more.
    fn check(&self) -> DispatchResult<()> {
        if self.0.load(Ordering::Acquire) {
            Err(DispatchError::StorageUnavailable("caller gave up; write rolled back".into()))
        } else {
            Ok(())
        }
    }
}

struct AbandonOnDrop {
    flag:  Abandon,
    armed: bool,
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.0.store(true, Ordering::Release);
        }
    }
}

impl TripRepository for SqliteTripRepository {
    fn insert(
        &self,
        trip: NewTrip,
        now:  Timestamp,
    ) -> impl Future<Output = DispatchResult<Trip>> + Send {
        self.run(move |conn, abandon| {
            let ms = now.timestamp_millis();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO trips \
                 (passenger_id, origin_lat, origin_lng, dest_lat, dest_lng, status, \
                  distance_km, fare, payment_method, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 'REQUESTED', ?6, ?7, ?8, ?9, ?9)",
                params![
                    trip.passenger_id.0,
                    trip.origin.lat,
                    trip.origin.lon,
                    trip.destination.lat,
                    trip.destination.lon,
                    trip.distance_km,
                    trip.fare,
                    trip.payment_method,
                    ms,
                ],
            )?;
            let id = row_id_to_trip_id(tx.last_insert_rowid())?;
            abandon.check()?;
            tx.commit()?;
            Ok(trip.into_trip(id, truncate_to_millis(now)))
        })
    }

    fn get(&self, id: TripId) -> impl Future<Output = DispatchResult<Trip>> + Send {
        self.run(move |conn, _| select_one(conn, id)?.ok_or(DispatchError::TripNotFound(id)))
    }

    fn update<F>(&self, id: TripId, apply: F) -> impl Future<Output = DispatchResult<Trip>> + Send
    where
        F: FnOnce(&mut Trip) -> DispatchResult<()> + Send + 'static,
    {
        self.run(move |conn, abandon| {
            let tx = conn.transaction()?;
            let mut trip = select_one(&tx, id)?.ok_or(DispatchError::TripNotFound(id))?;
            apply(&mut trip)?;
            write_back(&tx, &trip)?;
            abandon.check()?;
            tx.commit()?;
            Ok(trip)
        })
    }

    fn list_by_passenger(
        &self,
        passenger: ParticipantId,
    ) -> impl Future<Output = DispatchResult<Vec<Trip>>> + Send {
        self.run(move |conn, _| {
            select_many(
                conn,
                &format!("SELECT {COLUMNS} FROM trips WHERE passenger_id = ?1 ORDER BY id"),
                params![passenger.0],
            )
        })
    }

    fn list_by_driver(
        &self,
        driver: ParticipantId,
    ) -> impl Future<Output = DispatchResult<Vec<Trip>>> + Send {
        self.run(move |conn, _| {
            select_many(
                conn,
                &format!("SELECT {COLUMNS} FROM trips WHERE driver_id = ?1 ORDER BY id"),
                params![driver.0],
            )
        })
    }

    fn list_page(
        &self,
        offset: usize,
        limit:  usize,
    ) -> impl Future<Output = DispatchResult<Vec<Trip>>> + Send {
        self.run(move |conn, _| {
            let offset = i64::try_from(offset)
                .map_err(|_| DispatchError::InvalidRequest(format!("offset {offset} is out of range")))?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            select_many(
                conn,
                &format!("SELECT {COLUMNS} FROM trips ORDER BY id LIMIT ?1 OFFSET ?2"),
                params![limit, offset],
            )
        })
    }
}

// ── Row mapping ───────────────────────────────────────────────────────────────

fn select_one(conn: &Connection, id: TripId) -> DispatchResult<Option<Trip>> {
    let key = trip_id_to_row_id(id)?;
    let trip = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM trips WHERE id = ?1"),
            params![key],
            read_row,
        )
        .optional()?;
    Ok(trip)
}

fn select_many<P: rusqlite::Params>(conn: &Connection, sql: &str, args: P) -> DispatchResult<Vec<Trip>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(args, read_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn write_back(conn: &Connection, trip: &Trip) -> DispatchResult<()> {
    conn.execute(
        "UPDATE trips SET \
         driver_id = ?2, status = ?3, rating = ?4, comment = ?5, updated_at = ?6, \
         started_at = ?7, completed_at = ?8, cancelled_at = ?9, cancelled_by = ?10 \
         WHERE id = ?1",
        params![
            trip_id_to_row_id(trip.id)?,
            trip.driver_id.map(|d| d.0),
            trip.status.as_str(),
            trip.rating,
            trip.comment,
            trip.updated_at.timestamp_millis(),
            trip.started_at.map(|t| t.timestamp_millis()),
            trip.completed_at.map(|t| t.timestamp_millis()),
            trip.cancelled_at.map(|t| t.timestamp_millis()),
            trip.cancelled_by.map(|u| u.0),
        ],
    )?;
    Ok(())
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<Trip> {
    let raw_id: i64 = row.get(0)?;
    let status: String = row.get(7)?;
    Ok(Trip {
        id:             TripId(u64::try_from(raw_id).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, raw_id))?),
        passenger_id:   ParticipantId(row.get(1)?),
        driver_id:      row.get::<_, Option<u32>>(2)?.map(ParticipantId),
        origin:         GeoPoint::new(row.get(3)?, row.get(4)?),
        destination:    GeoPoint::new(row.get(5)?, row.get(6)?),
        status:         status
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
        distance_km:    row.get(8)?,
        fare:           row.get(9)?,
        payment_method: row.get(10)?,
        rating:         row.get(11)?,
        comment:        row.get(12)?,
        created_at:     millis(13, row.get(13)?)?,
        updated_at:     millis(14, row.get(14)?)?,
        started_at:     opt_millis(15, row.get(15)?)?,
        completed_at:   opt_millis(16, row.get(16)?)?,
        cancelled_at:   opt_millis(17, row.get(17)?)?,
        cancelled_by:   row.get::<_, Option<u32>>(18)?.map(ParticipantId),
    })
}

fn millis(idx: usize, ms: i64) -> rusqlite::Result<Timestamp> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn opt_millis(idx: usize, ms: Option<i64>) -> rusqlite::Result<Option<Timestamp>> {
    ms.map(|v| millis(idx, v)).transpose()
}

/// Storage keeps millisecond precision; mirror that in returned records.
fn truncate_to_millis(t: Timestamp) -> Timestamp {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

fn trip_id_to_row_id(id: TripId) -> DispatchResult<i64> {
    i64::try_from(id.0).map_err(|_| DispatchError::TripNotFound(id))
}

fn row_id_to_trip_id(raw: i64) -> DispatchResult<TripId> {
    u64::try_from(raw)
        .map(TripId)
        .map_err(|_| DispatchError::StorageUnavailable(format!("invalid row id {raw}")))
}
