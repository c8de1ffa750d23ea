//! Candidate queues and the per-trip lock book.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use rd_core::{ParticipantId, TripId};

// ── CandidateQueue ────────────────────────────────────────────────────────────

/// Ordered, duplicate-free list of drivers still to be offered a trip.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CandidateQueue {
    drivers: VecDeque<ParticipantId>,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with `drivers`, keeping first occurrences only.
    /// Returns the resulting length.
    pub fn replace<I>(&mut self, drivers: I) -> usize
    where
        I: IntoIterator<Item = ParticipantId>,
    {
        self.drivers.clear();
        for d in drivers {
            if !self.drivers.contains(&d) {
                self.drivers.push_back(d);
            }
        }
        self.drivers.len()
    }

    /// The driver currently on offer.
    #[inline]
    pub fn head(&self) -> Option<ParticipantId> {
        self.drivers.front().copied()
    }

    pub fn pop_head(&mut self) -> Option<ParticipantId> {
        self.drivers.pop_front()
    }

    pub fn clear(&mut self) {
        self.drivers.clear();
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ParticipantId> {
        self.drivers.iter().copied().collect()
    }
}

// ── CandidateBook ─────────────────────────────────────────────────────────────

/// Every live trip's candidate queue, each behind its own async mutex.
///
/// The map shard lock is only held long enough to clone the entry's `Arc`;
/// the trip lock itself is awaited afterwards, so contention on one trip
/// never blocks another.
#[derive(Default)]
pub struct CandidateBook {
    queues: DashMap<TripId, Arc<Mutex<CandidateQueue>>>,
}

impl CandidateBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive access to `trip`'s queue, creating it empty if absent.
    pub async fn lock(&self, trip: TripId) -> OwnedMutexGuard<CandidateQueue> {
        let slot = Arc::clone(self.queues.entry(trip).or_default().value());
        slot.lock_owned().await
    }

    /// Forget `trip`'s queue.  Called once a trip leaves REQUESTED.
    pub fn discard(&self, trip: TripId) {
        self.queues.remove(&trip);
    }

    /// Forget `trip`'s queue unless another task holds or awaits its lock.
    ///
    /// Call after dropping the guard.  Waiters keep the slot alive so that
    /// they and any later caller still serialise on the same mutex.
    pub fn release(&self, trip: TripId) {
        self.queues.remove_if(&trip, |_, slot| Arc::strong_count(slot) == 1);
    }

    /// Contents of `trip`'s queue, head first, without creating a slot.
    pub async fn snapshot(&self, trip: TripId) -> Vec<ParticipantId> {
        let slot = self.queues.get(&trip).map(|e| Arc::clone(e.value()));
        match slot {
            Some(slot) => slot.lock().await.to_vec(),
            None       => Vec::new(),
        }
    }

    /// Number of trips with a queue slot.
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
