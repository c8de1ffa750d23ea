//! `rd-dispatch`: trips, candidate queues and the dispatch protocol.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                     |
//! |-------------|--------------------------------------------------------------|
//! | [`trip`]    | `Trip`, `TripStatus`, `Review`, the pure state transitions   |
//! | [`queue`]   | `CandidateQueue`, `CandidateBook` (per-trip async locks)     |
//! | [`repo`]    | `TripRepository` trait, `InMemoryTripRepository`, `NewTrip` |
//! | [`sqlite`]  | `SqliteTripRepository` (feature = `"sqlite"` only)          |
//! | [`locator`] | `DriverLocator` trait, implemented for `PresenceStore`      |
//! | [`events`]  | `TripEvent`, `EventSink`, `NoopSink`, `LogSink`             |
//! | [`engine`]  | `DispatchEngine`: the orchestrator                          |
//! | [`builder`] | `DispatchEngineBuilder`                                      |
//! | [`config`]  | `DispatchConfig`, `ReviewPolicy`                             |
//! | [`error`]   | `DispatchError`, `DispatchResult<T>`                         |
//!
//! # Feature flags
//!
//! | Flag     | Effect                                                      |
//! |----------|-------------------------------------------------------------|
//! | `sqlite` | Enables `SqliteTripRepository` via `rusqlite`.              |
//! | `serde`  | Derives `Serialize`/`Deserialize` on public data types.     |
//!
//! # Locking
//!
//! Every operation that reads or changes a trip's candidate queue first takes
//! that trip's queue lock, then re-reads the trip.  Unrelated trips never
//! contend.  Trip writes themselves are single read-apply-write calls on the
//! repository, so a rejected transition leaves the stored trip untouched.
//!
//! Queue slots exist only for REQUESTED trips.  A call that finds its trip
//! missing or past REQUESTED gives the slot back unless another call is
//! holding or waiting on it.

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod locator;
pub mod queue;
pub mod repo;
pub mod trip;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use builder::DispatchEngineBuilder;
pub use config::{DispatchConfig, ReviewPolicy};
pub use engine::{CreatedTrip, DispatchEngine, RejectOutcome, TripRequest};
pub use error::{DispatchError, DispatchResult};
pub use events::{EventSink, LogSink, NoopSink, PublishError, TripEvent};
pub use locator::DriverLocator;
pub use queue::{CandidateBook, CandidateQueue};
pub use repo::{InMemoryTripRepository, NewTrip, TripRepository};
pub use trip::{Review, Trip, TripStatus};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTripRepository;
