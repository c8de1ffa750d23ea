//! Environment-variable helpers shared by every `…Config::from_env`.
//!
//! Unset or empty variables fall back to the supplied default; set but
//! unparsable variables are a [`CoreError::Config`] so a typo in a
//! deployment manifest fails loudly instead of silently using a default.

use std::str::FromStr;
use std::time::Duration;

use crate::{CoreError, CoreResult};

/// Read `key` from the process environment and parse it as `T`.
pub fn env_or<T>(key: &str, default: T) -> CoreResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| CoreError::Config(format!("{key}={raw:?}: {e}"))),
        _ => Ok(default),
    }
}

/// Read a comma-separated list, e.g. `RD_SEARCH_RADII_KM=5,10,15`.
pub fn env_list_or<T>(key: &str, default: Vec<T>) -> CoreResult<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_list(&raw)
            .map_err(|e| CoreError::Config(format!("{key}={raw:?}: {e}"))),
        _ => Ok(default),
    }
}

/// Read a millisecond count and convert it to a [`Duration`].
pub fn env_millis_or(key: &str, default: Duration) -> CoreResult<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    env_or(key, default_ms).map(Duration::from_millis)
}

/// Parse `"a, b,c"` into a `Vec<T>`, skipping empty items.
pub fn parse_list<T>(raw: &str) -> Result<Vec<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|e| format!("{s:?}: {e}")))
        .collect()
}
