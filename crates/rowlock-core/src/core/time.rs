// rowlock-core/src/core/time.rs
// ============================================================================
// Module: Rowlock Time Model
// Description: Canonical timestamp representation for lock rows.
// Purpose: Provide explicit wall-clock values with bounded arithmetic.
// Dependencies: serde, std
// ============================================================================

//! ## Overview
//! Lock rows carry wall-clock timestamps (`locked_at`, `used_at`) that feed
//! staleness decisions in the reaper jobs. Timestamps are unix epoch
//! milliseconds behind an opaque newtype; `Timestamp::now` is the only call
//! site that reads the clock, so tests construct explicit values instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Wall-clock instant stored on lock rows, in unix epoch milliseconds.
///
/// # Invariants
/// - Arithmetic saturates; no overflow panics on hostile or far-future input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self(i64::try_from(since_epoch.as_millis()).unwrap_or(i64::MAX))
    }

    /// Returns this timestamp moved `delta` into the past (saturating).
    #[must_use]
    pub fn earlier_by(self, delta: Duration) -> Self {
        let millis = i64::try_from(delta.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(millis))
    }

    /// Returns this timestamp moved `delta` into the future (saturating).
    #[must_use]
    pub fn later_by(self, delta: Duration) -> Self {
        let millis = i64::try_from(delta.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Returns true when this timestamp is strictly before `other`.
    #[must_use]
    pub const fn is_before(self, other: Self) -> bool {
        self.0 < other.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
