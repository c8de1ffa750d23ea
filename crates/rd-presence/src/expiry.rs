//! `ExpiryQueue`: TTL deadlines mapped to the participants that hit them.
//!
//! Every `set_position` pushes `(expires_at, participant)`.  A participant
//! refreshed before its deadline keeps its old queue entry; the sweep checks
//! the record's current deadline and skips such stale entries, so refreshes
//! stay O(log W) with no queue removal.

use std::collections::BTreeMap;

use rd_core::{ParticipantId, Timestamp};

#[derive(Default)]
pub struct ExpiryQueue {
    inner: BTreeMap<Timestamp, Vec<ParticipantId>>,
    /// Cached total entry count for O(1) `len()`.
    total: usize,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: Timestamp, participant: ParticipantId) {
        self.inner.entry(at).or_default().push(participant);
        self.total += 1;
    }

    /// Remove and return every participant whose deadline is `<= now`.
    pub fn drain_due(&mut self, now: Timestamp) -> Vec<ParticipantId> {
        let mut due = Vec::new();
        while let Some(entry) = self.inner.first_entry() {
            if *entry.key() > now {
                break;
            }
            let ids = entry.remove();
            self.total -= ids.len();
            due.extend(ids);
        }
        due
    }

    /// The earliest queued deadline, or `None` if empty.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.inner.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
