//! Per-role proximity index.
//!
//! # Data layout
//!
//! Two structures are kept in lock-step:
//!
//! * an R-tree (via `rstar`) of `[lat, lon]` points, used to prune radius
//!   queries to a small candidate set;
//! * an ordered `BTreeMap<ParticipantId, GeoPoint>`, used to find the old
//!   point on update/removal and to drive cursor-based listing.
//!
//! The R-tree works in raw degree space.  Radius queries therefore walk the
//! tree in Euclidean-degree order only as far as the radius's span reaches,
//! then re-rank the survivors by true haversine distance.  A span crossing
//! ±180° longitude is searched again from the centre shifted by 360°, and a
//! span covering a pole takes in every longitude.

use std::collections::BTreeMap;
use std::ops::Bound;

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use rd_core::{GeoPoint, ParticipantId};

// ── R-tree member entry ───────────────────────────────────────────────────────

/// Entry stored in the R-tree: a 2-D `[lat, lon]` point with its owner.
#[derive(Clone, Debug, PartialEq)]
struct MemberEntry {
    point: [f64; 2], // [lat, lon]
    id:    ParticipantId,
}

impl RTreeObject for MemberEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for MemberEntry {
    /// Squared Euclidean distance in lat/lon degree space.  Only used for
    /// traversal order and pruning; results are ranked by haversine.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.point[0] - point[0];
        let dlon = self.point[1] - point[1];
        dlat * dlat + dlon * dlon
    }
}

/// The query longitude plus a copy shifted by 360° on each side where the
/// span crosses the antimeridian.
fn wrapped_centres(lon: f64, d_lon: f64) -> Vec<f64> {
    let mut centres = vec![lon];
    if lon + d_lon > 180.0 {
        centres.push(lon - 360.0);
    }
    if lon - d_lon < -180.0 {
        centres.push(lon + 360.0);
    }
    centres
}

// ── ProximityIndex ────────────────────────────────────────────────────────────

/// Geospatial membership set for one role.
///
/// Not synchronised; [`PresenceStore`][crate::PresenceStore] owns one per
/// role behind its lock.
#[derive(Default)]
pub struct ProximityIndex {
    tree:    RTree<MemberEntry>,
    members: BTreeMap<ParticipantId, GeoPoint>,
}

impl ProximityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn point_of(&self, id: ParticipantId) -> Option<GeoPoint> {
        self.members.get(&id).copied()
    }

    /// Insert or move `id` to `point`.
    pub fn upsert(&mut self, id: ParticipantId, point: GeoPoint) {
        if let Some(old) = self.members.insert(id, point) {
            self.tree.remove(&MemberEntry { point: [old.lat, old.lon], id });
        }
        self.tree.insert(MemberEntry { point: [point.lat, point.lon], id });
    }

    /// Remove `id`; returns the point it was stored at.
    pub fn remove(&mut self, id: ParticipantId) -> Option<GeoPoint> {
        let old = self.members.remove(&id)?;
        self.tree.remove(&MemberEntry { point: [old.lat, old.lon], id });
        Some(old)
    }

    /// Every member within `radius_km` of `center`, ascending by haversine
    /// distance.  Ties are broken by ascending `ParticipantId`.
    ///
    /// Not truncated: callers apply their own limit after filtering out
    /// members they cannot see (expired records, the query origin).
    pub fn within(&self, center: GeoPoint, radius_km: f64) -> Vec<(ParticipantId, f64)> {
        let (d_lat, d_lon) = center.search_span_deg(radius_km);
        // Centre-to-corner of the span bounds any in-radius point's
        // Euclidean degree distance from the nearest centre copy.
        let bound_2 = d_lat * d_lat + d_lon * d_lon;

        let mut hits: Vec<(ParticipantId, f64)> = Vec::new();
        for lon in wrapped_centres(center.lon, d_lon) {
            let query = [center.lat, lon];
            hits.extend(
                self.tree
                    .nearest_neighbor_iter(&query)
                    .take_while(|e| e.distance_2(&query) <= bound_2)
                    .filter_map(|e| {
                        let d = center.distance_km(GeoPoint::new(e.point[0], e.point[1]));
                        (d <= radius_km).then_some((e.id, d))
                    }),
            );
        }

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        // A member reached from two centre copies sorts next to itself.
        hits.dedup_by_key(|h| h.0);
        hits
    }

    /// Up to `count` members with an id strictly greater than `after`, in id
    /// order.  `after = None` starts from the beginning.
    pub fn page(&self, after: Option<ParticipantId>, count: usize) -> Vec<(ParticipantId, GeoPoint)> {
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None     => Bound::Unbounded,
        };
        self.members
            .range((lower, Bound::Unbounded))
            .take(count)
            .map(|(&id, &p)| (id, p))
            .collect()
    }
}
