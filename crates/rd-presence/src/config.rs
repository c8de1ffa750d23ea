//! Presence store configuration.

use std::time::Duration;

use rd_core::config::env_or;
use rd_core::{CoreError, CoreResult};

/// Tunables for [`PresenceStore`][crate::PresenceStore].
#[derive(Clone, Debug, PartialEq)]
pub struct PresenceConfig {
    /// How long a position stays live without a refresh.  Default: 3600 s.
    pub ttl: Duration,

    /// Entries returned per page by cursor listing.  Default: 256.
    pub scan_page_size: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl:            Duration::from_secs(3_600),
            scan_page_size: 256,
        }
    }
}

impl PresenceConfig {
    /// Load from `RD_PRESENCE_TTL_SECS` and `RD_PRESENCE_SCAN_PAGE_SIZE`,
    /// falling back to [`Default`] for unset variables.
    pub fn from_env() -> CoreResult<Self> {
        let d = Self::default();
        let cfg = Self {
            ttl:            Duration::from_secs(env_or("RD_PRESENCE_TTL_SECS", d.ttl.as_secs())?),
            scan_page_size: env_or("RD_PRESENCE_SCAN_PAGE_SIZE", d.scan_page_size)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.ttl.is_zero() {
            return Err(CoreError::Config("presence ttl must be positive".into()));
        }
        if chrono::TimeDelta::from_std(self.ttl).is_err() {
            return Err(CoreError::Config(format!("presence ttl {:?} is out of range", self.ttl)));
        }
        if self.scan_page_size == 0 {
            return Err(CoreError::Config("scan page size must be at least 1".into()));
        }
        Ok(())
    }
}
