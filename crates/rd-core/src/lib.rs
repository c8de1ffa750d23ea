//! `rd-core`: foundational types for the `rust_dispatch` ride-hailing engine.
//!
//! This crate is a dependency of every other `rd-*` crate.  It intentionally
//! has no `rd-*` dependencies and minimal external ones (only `chrono` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module      | Contents                                                 |
//! |-------------|----------------------------------------------------------|
//! | [`ids`]     | `ParticipantId`, `TripId`                                |
//! | [`geo`]     | `GeoPoint`, haversine distance in kilometres, bbox       |
//! | [`role`]    | `Role` (driver / passenger)                              |
//! | [`time`]    | `Clock` trait, `SystemClock`, `ManualClock`              |
//! | [`config`]  | `env_or` / `env_list_or` environment helpers             |
//! | [`error`]   | `CoreError`, `CoreResult`                                |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.        |

pub mod config;
pub mod error;
pub mod geo;
pub mod ids;
pub mod role;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{CoreError, CoreResult};
pub use geo::GeoPoint;
pub use ids::{ParticipantId, TripId};
pub use role::Role;
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
