// rowlock-core/src/core/row.rs
// ============================================================================
// Module: Rowlock Lock Row
// Description: Persisted lock row entity and its owner pair.
// Purpose: Model row ownership so partial owner state is unrepresentable.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A [`LockRow`] is the single persisted artifact of the lock subsystem: one
//! row per lock code, owned by at most one (host, process) pair at a time.
//! Ownership is modeled as `Option<LockOwner>`, so a row with only one of
//! the two owner columns set cannot exist in memory; adapters decoding such
//! a row from a backing table must fail closed with a corruption error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::HostId;
use crate::core::identifiers::LockCode;
use crate::core::identifiers::LockRowId;
use crate::core::identifiers::ProcessId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Lock Owner
// ============================================================================

/// The (host, process) pair currently holding a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockOwner {
    /// Host identity of the holder.
    pub host: HostId,
    /// Process identifier of the holder on that host.
    pub process: ProcessId,
}

impl LockOwner {
    /// Creates a new owner pair.
    #[must_use]
    pub const fn new(host: HostId, process: ProcessId) -> Self {
        Self { host, process }
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.process, self.host)
    }
}

// ============================================================================
// SECTION: Lock Row
// ============================================================================

/// Persisted lock row.
///
/// # Invariants
/// - `locked_at` is `Some` iff `owner` is `Some`.
/// - `used_at` moves forward whenever the row is created, re-found, or
///   acquired; release leaves it untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRow {
    /// Surrogate key assigned by the store on creation.
    pub id: LockRowId,
    /// Unique code naming the protected resource.
    pub code: LockCode,
    /// Current holder, if any.
    pub owner: Option<LockOwner>,
    /// Moment of the last successful acquisition, if currently held.
    pub locked_at: Option<Timestamp>,
    /// Moment the row was last touched.
    pub used_at: Timestamp,
}

impl LockRow {
    /// Returns true when the row has no owner.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    /// Returns true when the row is held by exactly the provided owner.
    #[must_use]
    pub fn is_owned_by(&self, owner: &LockOwner) -> bool {
        self.owner.as_ref() == Some(owner)
    }
}
