// rowlock-core/src/runtime/settings.rs
// ============================================================================
// Module: Rowlock Settings
// Description: Tunable timings for acquisition polling and reaping.
// Purpose: Provide validated defaults for the lock runtime.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Settings cover the three timings the runtime needs: the blocking-poll
//! interval, the dead-process timeout used before probing a same-host owner,
//! and the retention window for unused free rows. All fields have serde
//! defaults so embedding applications only override what they tune.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default blocking-poll interval in milliseconds.
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
/// Default age of a held row before its owner is liveness-probed, in seconds.
const DEFAULT_DEAD_PROCESS_TIMEOUT_SECS: u64 = 100;
/// Default retention for unused free rows, in seconds (24 hours).
const DEFAULT_UNUSED_RETENTION_SECS: u64 = 86_400;

/// Returns the default poll interval in milliseconds.
const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Returns the default dead-process timeout in seconds.
const fn default_dead_process_timeout_secs() -> u64 {
    DEFAULT_DEAD_PROCESS_TIMEOUT_SECS
}

/// Returns the default unused-row retention in seconds.
const fn default_unused_retention_secs() -> u64 {
    DEFAULT_UNUSED_RETENTION_SECS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Settings validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A settings value is out of range.
    #[error("lock settings invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Tunable timings for the lock runtime.
///
/// # Invariants
/// - All values are strictly positive once validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSettings {
    /// Sleep between blocking-poll attempts, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Age of a held row before its same-host owner is probed, in seconds.
    #[serde(default = "default_dead_process_timeout_secs")]
    pub dead_process_timeout_secs: u64,
    /// Retention window for unused free rows, in seconds.
    #[serde(default = "default_unused_retention_secs")]
    pub unused_retention_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            dead_process_timeout_secs: default_dead_process_timeout_secs(),
            unused_retention_secs: default_unused_retention_secs(),
        }
    }
}

impl LockSettings {
    /// Validates that every timing is strictly positive.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when a value is zero.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.poll_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.dead_process_timeout_secs == 0 {
            return Err(SettingsError::Invalid(
                "dead_process_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.unused_retention_secs == 0 {
            return Err(SettingsError::Invalid(
                "unused_retention_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the dead-process timeout as a duration.
    #[must_use]
    pub const fn dead_process_timeout(&self) -> Duration {
        Duration::from_secs(self.dead_process_timeout_secs)
    }

    /// Returns the unused-row retention as a duration.
    #[must_use]
    pub const fn unused_retention(&self) -> Duration {
        Duration::from_secs(self.unused_retention_secs)
    }
}
