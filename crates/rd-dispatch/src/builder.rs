//! Fluent builder for constructing a [`DispatchEngine`].

use std::sync::Arc;

use rd_core::{Clock, SystemClock};
use rd_route::{FareSchedule, RouteOracle};

use crate::{
    CandidateBook, DispatchConfig, DispatchEngine, DispatchError, DispatchResult, DriverLocator,
    EventSink, LogSink, TripRepository,
};

/// Fluent builder for [`DispatchEngine<O, L, R>`].
///
/// # Required inputs
///
/// - `O: RouteOracle`: distance and duration for a trip
/// - `L: DriverLocator`: usually `Arc<PresenceStore>`
/// - `R: TripRepository`: where trips live
///
/// # Optional inputs (have defaults)
///
/// | Method        | Default                      |
/// |---------------|------------------------------|
/// | `.config(c)`  | `DispatchConfig::default()`  |
/// | `.fares(f)`   | `FareSchedule::default()`    |
/// | `.events(s)`  | `LogSink`                    |
/// | `.clock(c)`   | `SystemClock`                |
///
/// # Example
///
/// ```rust,ignore
/// let presence = Arc::new(PresenceStore::new(PresenceConfig::default())?);
/// let engine = DispatchEngineBuilder::new(
///         StraightLineOracle::default(),
///         presence.clone(),
///         InMemoryTripRepository::new(),
///     )
///     .config(DispatchConfig::from_env()?)
///     .build()?;
/// ```
pub struct DispatchEngineBuilder<O, L, R> {
    config:  DispatchConfig,
    fares:   FareSchedule,
    oracle:  O,
    locator: L,
    repo:    R,
    events:  Option<Arc<dyn EventSink>>,
    clock:   Option<Arc<dyn Clock>>,
}

impl<O, L, R> DispatchEngineBuilder<O, L, R>
where
    O: RouteOracle,
    L: DriverLocator,
    R: TripRepository,
{
    pub fn new(oracle: O, locator: L, repo: R) -> Self {
        Self {
            config: DispatchConfig::default(),
            fares:  FareSchedule::default(),
            oracle,
            locator,
            repo,
            events: None,
            clock:  None,
        }
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fares(mut self, fares: FareSchedule) -> Self {
        self.fares = fares;
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Clock used to stamp trip timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and return a ready engine.
    pub fn build(self) -> DispatchResult<DispatchEngine<O, L, R>> {
        self.config
            .validate()
            .map_err(|e| DispatchError::Config(e.to_string()))?;
        self.fares
            .validate()
            .map_err(|e| DispatchError::Config(e.to_string()))?;

        log::debug!(
            "[DISPATCH] Engine ready: radii {:?} km, {} per radius, fare {}/km",
            self.config.search_radii_km,
            self.config.candidates_per_radius,
            self.fares.per_km
        );

        Ok(DispatchEngine {
            config:  self.config,
            fares:   self.fares,
            oracle:  self.oracle,
            locator: self.locator,
            repo:    self.repo,
            book:    CandidateBook::new(),
            events:  self.events.unwrap_or_else(|| Arc::new(LogSink)),
            clock:   self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}
