//! `rd-presence`: last known positions and proximity queries.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                   |
//! |--------------|------------------------------------------------------------|
//! | [`position`] | `Position`, `PositionUpdate`, `NearbyPosition`             |
//! | [`index`]    | `ProximityIndex`: R-tree + ordered membership, one per role |
//! | [`expiry`]   | `ExpiryQueue`: TTL deadlines → participants               |
//! | [`store`]    | `PresenceStore`: records + both indices behind one lock   |
//! | [`config`]   | `PresenceConfig`                                           |
//! | [`error`]    | `PresenceError`, `PresenceResult<T>`                       |
//!
//! # Consistency model
//!
//! A position record and its index membership are always written under the
//! same write lock, so a proximity query can never observe a participant in
//! both role indices, in neither during a role change, or in an index
//! without a live record.  Expired records are invisible to every read even
//! before [`PresenceStore::sweep_expired`] physically removes them.
//!
//! Listing (`scan`/`all`) is cursor-based: each page holds the read lock only
//! for the duration of that page, so it never blocks writers for the length
//! of a full scan.  It is weakly consistent by design.

pub mod config;
pub mod error;
pub mod expiry;
pub mod index;
pub mod position;
pub mod store;


pub use config::PresenceConfig;
pub use error::{PresenceError, PresenceResult};
pub use expiry::ExpiryQueue;
pub use index::ProximityIndex;
pub use position::{NearbyPosition, Position, PositionUpdate};
pub use store::{PresenceStore, ScanPage};
