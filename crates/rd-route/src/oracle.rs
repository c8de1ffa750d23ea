//! The route cost oracle seam.

use std::future::Future;

use rd_core::GeoPoint;

use crate::RouteResult;

// ── RouteEstimate ─────────────────────────────────────────────────────────────

/// What an oracle answers for an origin/destination pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteEstimate {
    /// Road distance in metres.
    pub distance_m:    f64,
    /// Expected travel time in seconds.
    pub duration_secs: f64,
}

impl RouteEstimate {
    #[inline]
    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1_000.0
    }
}

// ── RouteSummary ──────────────────────────────────────────────────────────────

/// A [`RouteEstimate`] priced by a [`FareSchedule`][crate::FareSchedule].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteSummary {
    pub distance_m:    f64,
    pub duration_secs: f64,
    pub fare:          f64,
}

impl RouteSummary {
    #[inline]
    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1_000.0
    }

    /// Whole seconds, rounded up so an estimate is never optimistic.
    pub fn duration_whole_secs(&self) -> u64 {
        if self.duration_secs.is_finite() && self.duration_secs > 0.0 {
            self.duration_secs.ceil() as u64
        } else {
            0
        }
    }
}

// ── RouteOracle trait ─────────────────────────────────────────────────────────

/// Pluggable origin/destination cost estimator.
///
/// Called exactly once per trip creation with no internal retry; the engine
/// wraps every call in its own deadline.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync` and return `Send` futures so the
/// engine can be driven from any runtime worker.
pub trait RouteOracle: Send + Sync {
    fn route(
        &self,
        origin: GeoPoint,
        dest:   GeoPoint,
    ) -> impl Future<Output = RouteResult<RouteEstimate>> + Send;
}

impl<T: RouteOracle> RouteOracle for std::sync::Arc<T> {
    fn route(
        &self,
        origin: GeoPoint,
        dest:   GeoPoint,
    ) -> impl Future<Output = RouteResult<RouteEstimate>> + Send {
        (**self).route(origin, dest)
    }
}
