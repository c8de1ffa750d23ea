//! Dispatch engine configuration.

use std::time::Duration;

use rd_core::config::{env_list_or, env_millis_or, env_or};
use rd_core::{CoreError, CoreResult};

/// Tunables for [`DispatchEngine`][crate::DispatchEngine].
///
/// | Field                        | Default        | Variable                          |
/// |------------------------------|----------------|-----------------------------------|
/// | `search_radii_km`            | `[5, 10, 15]`  | `RD_SEARCH_RADII_KM`              |
/// | `candidates_per_radius`      | 5              | `RD_CANDIDATES_PER_RADIUS`        |
/// | `oracle_timeout`             | 5 s            | `RD_ORACLE_TIMEOUT_MS`            |
/// | `locator_timeout`            | 3 s            | `RD_LOCATOR_TIMEOUT_MS`           |
/// | `storage_timeout`            | 3 s            | `RD_STORAGE_TIMEOUT_MS`           |
/// | `allow_review_overwrite`     | `true`         | `RD_ALLOW_REVIEW_OVERWRITE`       |
/// | `review_requires_completion` | `false`        | `RD_REVIEW_REQUIRES_COMPLETION`   |
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchConfig {
    /// Radii tried in order during candidate acquisition, kilometres.
    pub search_radii_km:            Vec<f64>,
    /// Proximity-query limit at each radius.
    pub candidates_per_radius:      usize,
    pub oracle_timeout:             Duration,
    /// Deadline for each single-radius proximity query.
    pub locator_timeout:            Duration,
    pub storage_timeout:            Duration,
    pub allow_review_overwrite:     bool,
    pub review_requires_completion: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            search_radii_km:            vec![5.0, 10.0, 15.0],
            candidates_per_radius:      5,
            oracle_timeout:             Duration::from_secs(5),
            locator_timeout:            Duration::from_secs(3),
            storage_timeout:            Duration::from_secs(3),
            allow_review_overwrite:     true,
            review_requires_completion: false,
        }
    }
}

impl DispatchConfig {
    /// Load from `RD_*` variables, falling back to [`Default`] for unset ones.
    pub fn from_env() -> CoreResult<Self> {
        let d = Self::default();
        let cfg = Self {
            search_radii_km:            env_list_or("RD_SEARCH_RADII_KM", d.search_radii_km)?,
            candidates_per_radius:      env_or("RD_CANDIDATES_PER_RADIUS", d.candidates_per_radius)?,
            oracle_timeout:             env_millis_or("RD_ORACLE_TIMEOUT_MS", d.oracle_timeout)?,
            locator_timeout:            env_millis_or("RD_LOCATOR_TIMEOUT_MS", d.locator_timeout)?,
            storage_timeout:            env_millis_or("RD_STORAGE_TIMEOUT_MS", d.storage_timeout)?,
            allow_review_overwrite:     env_or("RD_ALLOW_REVIEW_OVERWRITE", d.allow_review_overwrite)?,
            review_requires_completion: env_or("RD_REVIEW_REQUIRES_COMPLETION", d.review_requires_completion)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.search_radii_km.is_empty() {
            return Err(CoreError::Config("at least one search radius is required".into()));
        }
        if self.search_radii_km.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(CoreError::Config(format!(
                "search radii must be positive, got {:?}",
                self.search_radii_km
            )));
        }
        if self.search_radii_km.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CoreError::Config(format!(
                "search radii must be strictly increasing, got {:?}",
                self.search_radii_km
            )));
        }
        if self.candidates_per_radius == 0 {
            return Err(CoreError::Config("candidates per radius must be at least 1".into()));
        }
        for (name, t) in [
            ("oracle", self.oracle_timeout),
            ("locator", self.locator_timeout),
            ("storage", self.storage_timeout),
        ] {
            if t.is_zero() {
                return Err(CoreError::Config(format!("{name} timeout must be positive")));
            }
        }
        Ok(())
    }

    pub fn review_policy(&self) -> ReviewPolicy {
        ReviewPolicy {
            allow_overwrite:     self.allow_review_overwrite,
            requires_completion: self.review_requires_completion,
        }
    }
}

/// How [`Trip::review`][crate::Trip::review] treats repeat and early reviews.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReviewPolicy {
    pub allow_overwrite:     bool,
    pub requires_completion: bool,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        DispatchConfig::default().review_policy()
    }
}
