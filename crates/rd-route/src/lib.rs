//! `rd-route`: route cost estimation for trip creation.
//!
//! # Crate layout
//!
//! | Module            | Contents                                                  |
//! |-------------------|-----------------------------------------------------------|
//! | [`oracle`]        | `RouteOracle` trait, `RouteEstimate`, `RouteSummary`      |
//! | [`fare`]          | `FareSchedule`: the per-kilometre pricing rule           |
//! | [`straight_line`] | `StraightLineOracle`: haversine × detour estimator       |
//! | [`error`]         | `RouteError`, `RouteResult<T>`                            |
//!
//! # Pluggability
//!
//! The dispatch engine only ever calls routing through [`RouteOracle`], so a
//! remote maps service, a cached client or a test double can be swapped in
//! without touching dispatch logic.  Pricing is *not* delegated: the oracle
//! supplies distance and duration, and [`FareSchedule`] turns distance into a
//! fare.

pub mod error;
pub mod fare;
pub mod oracle;
pub mod straight_line;


pub use error::{RouteError, RouteResult};
pub use fare::FareSchedule;
pub use oracle::{RouteEstimate, RouteOracle, RouteSummary};
pub use straight_line::StraightLineOracle;
