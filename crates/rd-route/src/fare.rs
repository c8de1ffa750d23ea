//! The per-kilometre pricing rule.

use rd_core::config::env_or;
use rd_core::{CoreError, CoreResult};

use crate::{RouteEstimate, RouteSummary};

/// Linear fare: `per_km × distance_km`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FareSchedule {
    /// Price per kilometre of road distance.  Default: 5.0.
    pub per_km: f64,
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self { per_km: 5.0 }
    }
}

impl FareSchedule {
    pub fn new(per_km: f64) -> CoreResult<Self> {
        let s = Self { per_km };
        s.validate()?;
        Ok(s)
    }

    /// Load from `RD_FARE_PER_KM`, falling back to [`Default`].
    pub fn from_env() -> CoreResult<Self> {
        Self::new(env_or("RD_FARE_PER_KM", Self::default().per_km)?)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.per_km.is_finite() && self.per_km >= 0.0 {
            Ok(())
        } else {
            Err(CoreError::Config(format!("fare per km must be >= 0, got {}", self.per_km)))
        }
    }

    #[inline]
    pub fn fare_for_km(&self, distance_km: f64) -> f64 {
        self.per_km * distance_km.max(0.0)
    }

    pub fn price(&self, estimate: RouteEstimate) -> RouteSummary {
        RouteSummary {
            distance_m:    estimate.distance_m,
            duration_secs: estimate.duration_secs,
            fare:          self.fare_for_km(estimate.distance_km()),
        }
    }
}
