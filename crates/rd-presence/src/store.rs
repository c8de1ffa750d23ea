//! The `PresenceStore`: position records plus one proximity index per role.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::TimeDelta;
use rustc_hash::FxHashMap;

use rd_core::{Clock, GeoPoint, ParticipantId, Role, SystemClock, Timestamp};

use crate::{
    ExpiryQueue, NearbyPosition, Position, PositionUpdate, PresenceConfig, PresenceError,
    PresenceResult, ProximityIndex,
};

/// A stored position and the instant it stops being live.
struct Record {
    position:   Position,
    expires_at: Timestamp,
}

impl Record {
    #[inline]
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at > now
    }
}

/// Everything guarded by the store's single lock.
#[derive(Default)]
struct PresenceState {
    records:    FxHashMap<ParticipantId, Record>,
    drivers:    ProximityIndex,
    passengers: ProximityIndex,
    expiry:     ExpiryQueue,
}

impl PresenceState {
    fn index(&self, role: Role) -> &ProximityIndex {
        match role {
            Role::Driver    => &self.drivers,
            Role::Passenger => &self.passengers,
        }
    }

    fn index_mut(&mut self, role: Role) -> &mut ProximityIndex {
        match role {
            Role::Driver    => &mut self.drivers,
            Role::Passenger => &mut self.passengers,
        }
    }

    fn live(&self, id: ParticipantId, now: Timestamp) -> Option<&Record> {
        self.records.get(&id).filter(|r| r.is_live(now))
    }

    /// Remove every record whose deadline has passed, with its index entry.
    fn sweep(&mut self, now: Timestamp) -> usize {
        let mut removed = 0;
        for id in self.expiry.drain_due(now) {
            let expired = self.records.get(&id).is_some_and(|r| !r.is_live(now));
            if !expired {
                continue; // refreshed since this deadline was queued
            }
            if let Some(rec) = self.records.remove(&id) {
                self.index_mut(rec.position.role).remove(id);
                removed += 1;
            }
        }
        removed
    }

    fn nearby(
        &self,
        role:      Role,
        center:    GeoPoint,
        radius_km: f64,
        limit:     usize,
        exclude:   Option<ParticipantId>,
        now:       Timestamp,
    ) -> Vec<NearbyPosition> {
        if limit == 0 {
            return Vec::new();
        }
        self.index(role)
            .within(center, radius_km)
            .into_iter()
            .filter(|(id, _)| Some(*id) != exclude)
            .filter_map(|(id, distance_km)| {
                let rec = self.live(id, now)?;
                (rec.position.role == role).then(|| NearbyPosition {
                    position: rec.position.clone(),
                    distance_km,
                })
            })
            .take(limit)
            .collect()
    }
}

/// One page of a cursor scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage {
    pub positions: Vec<Position>,
    /// Pass back as `after` to continue; `None` when the scan is complete.
    pub next:      Option<ParticipantId>,
}

/// Last-known positions of every active participant, with TTL expiry and
/// per-role proximity queries.
///
/// Thread-safe; share it behind an `Arc`.  Every operation holds the lock
/// only for its own duration and never across an `.await`.
pub struct PresenceStore {
    config: PresenceConfig,
    ttl:    TimeDelta,
    clock:  Arc<dyn Clock>,
    state:  RwLock<PresenceState>,
}

impl PresenceStore {
    /// Create a store reading the system clock.
    pub fn new(config: PresenceConfig) -> PresenceResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: PresenceConfig, clock: Arc<dyn Clock>) -> PresenceResult<Self> {
        config
            .validate()
            .map_err(|e| PresenceError::Config(e.to_string()))?;
        let ttl = TimeDelta::from_std(config.ttl)
            .map_err(|e| PresenceError::Config(format!("ttl: {e}")))?;
        Ok(Self {
            config,
            ttl,
            clock,
            state: RwLock::new(PresenceState::default()),
        })
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    fn read(&self) -> PresenceResult<RwLockReadGuard<'_, PresenceState>> {
        self.state
            .read()
            .map_err(|_| PresenceError::StorageUnavailable("presence lock poisoned".into()))
    }

    fn write(&self) -> PresenceResult<RwLockWriteGuard<'_, PresenceState>> {
        self.state
            .write()
            .map_err(|_| PresenceError::StorageUnavailable("presence lock poisoned".into()))
    }

    // ── Writes ────────────────────────────────────────────────────────────

    /// Upsert a participant's position and its index membership.
    ///
    /// If the participant was previously live under the other role, the old
    /// index entry is dropped in the same critical section.
    pub fn set_position(&self, update: PositionUpdate) -> PresenceResult<Position> {
        update.point.validate()?;
        let now = self.clock.now();
        let position = Position {
            participant_id: update.participant_id,
            role:           update.role,
            point:          update.point,
            speed:          update.speed,
            heading:        update.heading,
            captured_at:    update.captured_at.unwrap_or(now),
        };
        let expires_at = now + self.ttl;
        let id = position.participant_id;

        let mut state = self.write()?;
        let swept = state.sweep(now);
        if swept > 0 {
            log::debug!("[PRESENCE] Swept {swept} expired positions");
        }

        let prev = state.records.get(&id).map(|r| r.position.role);
        if let Some(prev) = prev.filter(|&r| r != position.role) {
            state.index_mut(prev).remove(id);
        }
        state.index_mut(position.role).upsert(id, position.point);
        state.expiry.push(expires_at, id);
        state.records.insert(id, Record { position: position.clone(), expires_at });

        log::debug!(
            "[PRESENCE] {} {} at {} (ttl {}s)",
            position.role,
            id,
            position.point,
            self.ttl.num_seconds()
        );
        Ok(position)
    }

    /// Delete a participant's position and its entry in `role`'s index.
    pub fn remove_position(&self, id: ParticipantId, role: Role) -> PresenceResult<Position> {
        let now = self.clock.now();
        let mut state = self.write()?;

        let actual = match state.records.get(&id) {
            Some(rec) => rec.position.role,
            None => {
                state.index_mut(role).remove(id);
                return Err(PresenceError::PositionNotFound(id));
            }
        };
        if actual != role {
            return Err(PresenceError::RoleMismatch { participant: id, expected: role, actual });
        }

        state.index_mut(role).remove(id);
        let rec = state.records.remove(&id).ok_or(PresenceError::PositionNotFound(id))?;
        if !rec.is_live(now) {
            return Err(PresenceError::PositionNotFound(id));
        }
        log::debug!("[PRESENCE] Removed {role} {id}");
        Ok(rec.position)
    }

    /// Move a participant's index membership from `old` to `new`, keeping
    /// the position itself.
    pub fn change_role(&self, id: ParticipantId, old: Role, new: Role) -> PresenceResult<Position> {
        let now = self.clock.now();
        let mut state = self.write()?;

        let rec = state
            .records
            .get_mut(&id)
            .filter(|r| r.is_live(now))
            .ok_or(PresenceError::PositionNotFound(id))?;
        let actual = rec.position.role;
        if actual != old {
            return Err(PresenceError::RoleMismatch { participant: id, expected: old, actual });
        }
        if old == new {
            return Ok(rec.position.clone());
        }

        rec.position.role = new;
        let position = rec.position.clone();
        state.index_mut(old).remove(id);
        state.index_mut(new).upsert(id, position.point);

        log::info!("[PRESENCE] Participant {id} switched role {old} -> {new}");
        Ok(position)
    }

    /// Physically remove every expired record.  Returns how many went.
    pub fn sweep_expired(&self) -> PresenceResult<usize> {
        let now = self.clock.now();
        let removed = self.write()?.sweep(now);
        if removed > 0 {
            log::debug!("[PRESENCE] Swept {removed} expired positions");
        }
        Ok(removed)
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    pub fn get_position(&self, id: ParticipantId) -> PresenceResult<Position> {
        let now = self.clock.now();
        self.read()?
            .live(id, now)
            .map(|r| r.position.clone())
            .ok_or(PresenceError::PositionNotFound(id))
    }

    /// Up to `limit` participants of the origin's counterpart role within
    /// `radius_km` of the origin's live position, nearest first.
    pub fn nearest(
        &self,
        origin:    ParticipantId,
        radius_km: f64,
        limit:     usize,
    ) -> PresenceResult<Vec<NearbyPosition>> {
        check_radius(radius_km)?;
        let now = self.clock.now();
        let state = self.read()?;
        let from = state.live(origin, now).ok_or(PresenceError::PositionNotFound(origin))?;
        let role = from.position.role.counterpart();
        let center = from.position.point;
        Ok(state.nearby(role, center, radius_km, limit, Some(origin), now))
    }

    /// Up to `limit` participants of `role` within `radius_km` of `center`.
    pub fn nearest_to(
        &self,
        role:      Role,
        center:    GeoPoint,
        radius_km: f64,
        limit:     usize,
    ) -> PresenceResult<Vec<NearbyPosition>> {
        check_radius(radius_km)?;
        center.validate()?;
        let now = self.clock.now();
        Ok(self.read()?.nearby(role, center, radius_km, limit, None, now))
    }

    /// One page of `role`'s live members with ids strictly after `after`.
    pub fn scan(
        &self,
        role:  Role,
        after: Option<ParticipantId>,
        count: usize,
    ) -> PresenceResult<ScanPage> {
        let now = self.clock.now();
        let state = self.read()?;
        let members = state.index(role).page(after, count);
        let next = if members.len() == count {
            members.last().map(|(id, _)| *id)
        } else {
            None
        };
        let positions = members
            .into_iter()
            .filter_map(|(id, _)| state.live(id, now).map(|r| r.position.clone()))
            .collect();
        Ok(ScanPage { positions, next })
    }

    /// Every live member of `role`, fetched page by page.
    pub fn all(&self, role: Role) -> PresenceResult<Vec<Position>> {
        let mut out = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.scan(role, cursor, self.config.scan_page_size)?;
            out.extend(page.positions);
            match page.next {
                Some(next) => cursor = Some(next),
                None       => return Ok(out),
            }
        }
    }

    /// Index membership count for `role`.  May include expired entries not
    /// yet swept.
    pub fn len(&self, role: Role) -> PresenceResult<usize> {
        Ok(self.read()?.index(role).len())
    }

    /// `true` when no participant of either role is indexed.
    pub fn is_empty(&self) -> PresenceResult<bool> {
        let state = self.read()?;
        Ok(state.drivers.is_empty() && state.passengers.is_empty())
    }

    /// `true` if `id` is currently a member of `role`'s index.
    pub fn is_indexed(&self, id: ParticipantId, role: Role) -> PresenceResult<bool> {
        Ok(self.read()?.index(role).contains(id))
    }
}

fn check_radius(radius_km: f64) -> PresenceResult<()> {
    if radius_km.is_finite() && radius_km > 0.0 {
        Ok(())
    } else {
        Err(PresenceError::InvalidQuery(format!("radius must be positive, got {radius_km}")))
    }
}
