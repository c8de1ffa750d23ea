//! Geographic coordinate type and spatial utilities.
//!
//! `GeoPoint` uses `f64` latitude/longitude so that a position written by a
//! client reads back bit-identical, and distances are reported in kilometres
//! (the unit of every radius in the dispatch protocol).

use crate::{CoreError, CoreResult};

/// Mean Earth radius, kilometres.
pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Kilometres spanned by one degree of latitude.
const KM_PER_DEG_LAT: f64 = 111.195;

/// A WGS-84 geographic coordinate.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Construct a point, rejecting NaN and out-of-range values.
    pub fn checked(lat: f64, lon: f64) -> CoreResult<Self> {
        let p = Self { lat, lon };
        p.validate()?;
        Ok(p)
    }

    pub fn validate(self) -> CoreResult<()> {
        let ok = self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon);
        if ok {
            Ok(())
        } else {
            Err(CoreError::InvalidCoordinate { lat: self.lat, lon: self.lon })
        }
    }

    /// Haversine great-circle distance in kilometres.
    pub fn distance_km(self, other: GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();

        let a = (d_lat * 0.5).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon * 0.5).sin().powi(2);

        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }

    /// Half-extents `(d_lat, d_lon)` in degrees of a box around `self` that
    /// contains every point within `radius_km`.
    ///
    /// `d_lon` is 180 when the circle reaches a pole: every longitude is then
    /// in range.  Neither extent is clamped to the coordinate domain.
    pub fn search_span_deg(self, radius_km: f64) -> (f64, f64) {
        let d_lat = radius_km / KM_PER_DEG_LAT;
        let max_abs_lat = self.lat.abs() + d_lat;
        if max_abs_lat >= 90.0 {
            return (d_lat, 180.0);
        }
        let d_lon = (radius_km / (KM_PER_DEG_LAT * max_abs_lat.to_radians().cos())).min(180.0);
        (d_lat, d_lon)
    }

    /// Lat/lon box that contains every point within `radius_km` of `self`.
    ///
    /// Returned as `([min_lat, min_lon], [max_lat, max_lon])`, clamped to the
    /// coordinate domain.  The box never wraps the antimeridian; use
    /// [`search_span_deg`](Self::search_span_deg) for wrap-aware searches.
    pub fn bounding_box(self, radius_km: f64) -> ([f64; 2], [f64; 2]) {
        let (d_lat, d_lon) = self.search_span_deg(radius_km);
        (
            [(self.lat - d_lat).max(-90.0), (self.lon - d_lon).max(-180.0)],
            [(self.lat + d_lat).min(90.0), (self.lon + d_lon).min(180.0)],
        )
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}
