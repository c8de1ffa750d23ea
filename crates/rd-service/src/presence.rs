//! Presence service: SetPosition, GetPosition, FindNearest, ListAll.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use rd_core::{GeoPoint, ParticipantId, Role, Timestamp};
use rd_presence::{PositionUpdate, PresenceError, PresenceStore};

use crate::{ListAllView, PositionView, Reply};

/// `top_n` used by FindNearest when the caller sends zero or less.
pub const DEFAULT_TOP_N: usize = 10;
/// Radius used by FindNearest when the caller sends zero or less, km.
pub const DEFAULT_RADIUS_KM: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPositionRequest {
    pub participant_id: ParticipantId,
    pub role:           Role,
    pub latitude:       f64,
    pub longitude:      f64,
    #[serde(default)]
    pub speed:          f64,
    #[serde(default)]
    pub heading:        String,
    /// Capture time reported by the device; "now" when absent.
    #[serde(default)]
    pub captured_at:    Option<Timestamp>,
}

pub struct PresenceService {
    store: Arc<PresenceStore>,
}

impl PresenceService {
    pub fn new(store: Arc<PresenceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PresenceStore> {
        &self.store
    }

    pub fn set_position(&self, req: SetPositionRequest) -> Reply<PositionView> {
        log::info!("[PRESENCE] SetPosition called for {} {}", req.role, req.participant_id);
        let update = PositionUpdate {
            participant_id: req.participant_id,
            role:           req.role,
            point:          GeoPoint::new(req.latitude, req.longitude),
            speed:          req.speed,
            heading:        req.heading,
            captured_at:    req.captured_at,
        };
        let result = self.store.set_position(update).map(PositionView::from);
        log_failure("SetPosition", &result);
        Reply::from_result(result, "Position updated successfully")
    }

    pub fn get_position(&self, id: ParticipantId) -> Reply<PositionView> {
        log::info!("[PRESENCE] GetPosition called for {id}");
        let result = self.store.get_position(id).map(PositionView::from);
        log_failure("GetPosition", &result);
        Reply::from_result(result, "Position retrieved successfully")
    }

    /// Take a participant offline under `role`.
    pub fn remove_position(&self, id: ParticipantId, role: Role) -> Reply<PositionView> {
        log::info!("[PRESENCE] RemovePosition called for {role} {id}");
        let result = self.store.remove_position(id, role).map(PositionView::from);
        log_failure("RemovePosition", &result);
        Reply::from_result(result, "Position removed successfully")
    }

    pub fn change_role(&self, id: ParticipantId, old: Role, new: Role) -> Reply<PositionView> {
        log::info!("[PRESENCE] ChangeRole called for {id}: {old} -> {new}");
        let result = self.store.change_role(id, old, new).map(PositionView::from);
        log_failure("ChangeRole", &result);
        Reply::from_result(result, "Role changed successfully")
    }

    /// Nearest participants of the counterpart role.  Non-positive `top_n`
    /// and `radius_km` fall back to 10 and 10 km.
    pub fn find_nearest(&self, id: ParticipantId, top_n: i64, radius_km: f64) -> Reply<Vec<PositionView>> {
        let limit = usize::try_from(top_n).ok().filter(|n| *n > 0).unwrap_or(DEFAULT_TOP_N);
        let radius_km = if radius_km > 0.0 { radius_km } else { DEFAULT_RADIUS_KM };
        log::info!("[PRESENCE] FindNearest called for {id}: top {limit} within {radius_km} km");

        match self.store.nearest(id, radius_km, limit) {
            Ok(hits) => {
                let views: Vec<PositionView> = hits.into_iter().map(PositionView::from).collect();
                let message = format!("Found {} nearest participants", views.len());
                Reply::ok(message, views)
            }
            Err(e) => {
                log::warn!("[PRESENCE] FindNearest failed for {id}: {e}");
                Reply::error(&e)
            }
        }
    }

    /// Every live participant of both roles, drivers first.
    pub fn list_all(&self) -> Reply<ListAllView> {
        log::info!("[PRESENCE] ListAll called");
        let mut positions = Vec::new();
        for role in Role::ALL {
            match self.store.all(role) {
                Ok(list) => positions.extend(list.into_iter().map(PositionView::from)),
                Err(e) => {
                    log::warn!("[PRESENCE] ListAll failed: {e}");
                    return Reply::error(&e);
                }
            }
        }
        let total_count = positions.len();
        Reply::ok("All positions retrieved successfully", ListAllView { positions, total_count })
    }
}

fn log_failure<T>(op: &str, result: &Result<T, PresenceError>) {
    if let Err(e) = result {
        log::warn!("[PRESENCE] {op} failed: {e}");
    }
}
