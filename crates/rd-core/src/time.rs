//! Wall-clock abstraction.
//!
//! # Design
//!
//! Every component that stamps or expires records reads time through a
//! [`Clock`] rather than calling `Utc::now()` directly.  Production code uses
//! [`SystemClock`]; tests use [`ManualClock`] so TTL expiry and trip
//! timestamps are exact and repeatable.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// UTC instant used for every timestamp in the engine.
pub type Timestamp = DateTime<Utc>;

/// Source of the current time.
///
/// Implementations must be `Send + Sync`: a single clock is shared by every
/// concurrently running request.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

// ── SystemClock ───────────────────────────────────────────────────────────────

/// Reads the host's real-time clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

// ── ManualClock ───────────────────────────────────────────────────────────────

/// A clock that only moves when told to.  Millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
    unix_millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { unix_millis: AtomicI64::new(start.timestamp_millis()) }
    }

    /// Start at a fixed Unix timestamp (seconds).
    pub fn at_unix_secs(secs: i64) -> Self {
        Self { unix_millis: AtomicI64::new(secs.saturating_mul(1_000)) }
    }

    pub fn advance(&self, by: Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.unix_millis.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, to: Timestamp) {
        self.unix_millis.store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_unix_secs(0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        DateTime::from_timestamp_millis(self.unix_millis.load(Ordering::SeqCst))
            .unwrap_or_default()
    }
}
