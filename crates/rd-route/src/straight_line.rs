//! `StraightLineOracle`: an offline estimator.
//!
//! Road distance is approximated as the great-circle distance times a detour
//! factor, and duration assumes a constant urban speed:
//!
//! | Parameter       | Default  |
//! |-----------------|----------|
//! | `detour_factor` | 1.3      |
//! | `speed_kmh`     | 30 km/h  |

use std::future::{ready, Future};

use rd_core::GeoPoint;

use crate::{RouteError, RouteEstimate, RouteOracle, RouteResult};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StraightLineOracle {
    pub detour_factor: f64,
    pub speed_kmh:     f64,
}

impl Default for StraightLineOracle {
    fn default() -> Self {
        Self { detour_factor: 1.3, speed_kmh: 30.0 }
    }
}

impl StraightLineOracle {
    pub fn new(detour_factor: f64, speed_kmh: f64) -> Self {
        Self { detour_factor, speed_kmh }
    }

    /// Synchronous form of [`RouteOracle::route`].
    pub fn estimate(&self, origin: GeoPoint, dest: GeoPoint) -> RouteResult<RouteEstimate> {
        origin.validate()?;
        dest.validate()?;
        if !(self.speed_kmh.is_finite() && self.speed_kmh > 0.0) {
            return Err(RouteError::Unavailable(format!(
                "assumed speed must be positive, got {}",
                self.speed_kmh
            )));
        }

        let road_km = origin.distance_km(dest) * self.detour_factor.max(1.0);
        let estimate = RouteEstimate {
            distance_m:    road_km * 1_000.0,
            duration_secs: road_km / self.speed_kmh * 3_600.0,
        };
        log::debug!(
            "[ROUTE] {origin} -> {dest}: {:.0} m, {:.0} s",
            estimate.distance_m,
            estimate.duration_secs
        );
        Ok(estimate)
    }
}

impl RouteOracle for StraightLineOracle {
    fn route(
        &self,
        origin: GeoPoint,
        dest:   GeoPoint,
    ) -> impl Future<Output = RouteResult<RouteEstimate>> + Send {
        ready(self.estimate(origin, dest))
    }
}
