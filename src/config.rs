//! Synchronizer timing configuration, loaded from environment variables.
//!
//! DESIGN
//! ======
//! Compiled defaults overridable per deployment. The startup timeout is the
//! liveness bound on the initial session query; the fetch timeout bounds a
//! single profile lookup. Both fail open: expiry resolves to "signed out"
//! and "no profile" respectively, never a hung `loading` flag.

use std::time::Duration;

const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Timing knobs for the synchronizer.
#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// How long the initial session query may stay unresolved before the
    /// machine fails open to signed-out.
    pub startup_timeout: Duration,
    /// How long a single profile fetch may run before it settles to
    /// "no profile".
    pub fetch_timeout: Duration,
}

impl SyncConfig {
    /// Load from `AUTH_STARTUP_TIMEOUT_MS` and `PROFILE_FETCH_TIMEOUT_MS`,
    /// falling back to compiled defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let startup_ms = env_parse("AUTH_STARTUP_TIMEOUT_MS", DEFAULT_STARTUP_TIMEOUT_MS);
        let fetch_ms = env_parse("PROFILE_FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS);
        Self {
            startup_timeout: Duration::from_millis(startup_ms),
            fetch_timeout: Duration::from_millis(fetch_ms),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_millis(DEFAULT_STARTUP_TIMEOUT_MS),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
