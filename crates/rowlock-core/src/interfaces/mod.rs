// rowlock-core/src/interfaces/mod.rs
// ============================================================================
// Module: Rowlock Interfaces
// Description: Backend-agnostic interfaces for lock persistence and liveness.
// Purpose: Define the contract surfaces consumed by the Rowlock runtime.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how Rowlock integrates with the backing row store and
//! the operating environment without embedding backend-specific details.
//! Implementations must be deterministic for a given backend state and fail
//! closed: a store failure is surfaced as an error and is never interpreted
//! as "the lock is free".

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::HostId;
use crate::core::LockCode;
use crate::core::LockOwner;
use crate::core::LockRow;
use crate::core::LockRowId;
use crate::core::ProcessId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Lock row store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - No variant is ever mapped to "lock is free" by callers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store is unreachable or failed to execute an operation.
    #[error("lock store unavailable: {0}")]
    Unavailable(String),
    /// Stored data violates an integrity invariant (e.g. partial owner).
    #[error("lock store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("lock store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data or arguments are invalid.
    #[error("lock store invalid data: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Lock Row Store
// ============================================================================

/// Persistence contract for lock rows.
///
/// The conditional owner update is the sole synchronization primitive of the
/// whole subsystem; implementations must make it atomic with respect to
/// concurrent updates from other processes and hosts. Every other operation
/// is plain row access.
pub trait LockRowStore: Send + Sync {
    /// Looks up a row by its unique code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn find_by_code(&self, code: &LockCode) -> Result<Option<LockRow>, StoreError>;

    /// Finds the row for `code`, creating it when absent.
    ///
    /// Bumps `used_at` to `now` whether the row was created or re-found. A
    /// creation race with another process must resolve to the existing row;
    /// a uniqueness violation is never surfaced to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the row cannot be created or re-read.
    fn create_if_absent(&self, code: &LockCode, now: Timestamp) -> Result<LockRow, StoreError>;

    /// Atomically assigns `new_owner` to the row iff its current owner equals
    /// `expected` (`None` meaning the row must be free).
    ///
    /// On success also sets `locked_at` and `used_at` to `now`. Returns the
    /// number of rows affected: `0` means the predicate did not hold and
    /// nothing changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update cannot be executed.
    fn conditional_update_owner(
        &self,
        id: LockRowId,
        expected: Option<&LockOwner>,
        new_owner: &LockOwner,
        now: Timestamp,
    ) -> Result<u64, StoreError>;

    /// Unconditionally clears owner and `locked_at` for the row. Idempotent;
    /// clearing an already-free or missing row is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update cannot be executed.
    fn clear_owner(&self, id: LockRowId) -> Result<(), StoreError>;

    /// Deletes rows that are free and were last used before `cutoff`.
    ///
    /// The free-row predicate is part of the operation itself: a held row is
    /// never deleted regardless of its `used_at` age.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete cannot be executed.
    fn delete_unused_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;

    /// Returns the distinct set of hosts currently owning at least one row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the scan fails.
    fn distinct_owner_hosts(&self) -> Result<BTreeSet<HostId>, StoreError>;

    /// Returns all rows currently owned by `host`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the scan fails.
    fn owned_by_host(&self, host: &HostId) -> Result<Vec<LockRow>, StoreError>;

    /// Returns rows owned by `host` whose `locked_at` is before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the scan fails.
    fn owned_by_host_locked_before(
        &self,
        host: &HostId,
        cutoff: Timestamp,
    ) -> Result<Vec<LockRow>, StoreError>;
}

// ============================================================================
// SECTION: Process Liveness
// ============================================================================

/// Environment contract answering identity and liveness questions.
///
/// Implementations are infallible by design: when liveness cannot be
/// determined they must answer conservatively (`true`), because a false
/// "dead" verdict lets a live owner's lock be stolen.
pub trait ProcessLiveness: Send + Sync {
    /// Returns the identity of the host this process runs on.
    fn current_host(&self) -> HostId;

    /// Returns the identifier of the current process.
    fn current_process(&self) -> ProcessId;

    /// Reports whether the given process on the given host is alive.
    fn is_process_alive(&self, host: &HostId, process: ProcessId) -> bool;

    /// Returns the set of host identities currently considered part of the
    /// cluster. Rows owned by hosts outside this set are dangling.
    fn valid_hosts(&self) -> BTreeSet<HostId>;
}

// ============================================================================
// SECTION: Cross-Host Checker
// ============================================================================

/// Strategy consulted when a lock is owned by a different host.
///
/// Same-host owners are probed directly through [`ProcessLiveness`]; for a
/// remote owner the runtime cannot probe the pid itself and delegates to
/// this strategy instead.
pub trait CrossHostLockChecker: Send + Sync {
    /// Reports whether the remote `owner` still holds the lock on `row`.
    fn peer_holds_lock(&self, row: &LockRow, owner: &LockOwner) -> bool;
}

/// Default cross-host strategy: a remote owner is always assumed to still
/// hold its lock. Conservative, never steals a live remote lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeLocked;

impl CrossHostLockChecker for AssumeLocked {
    fn peer_holds_lock(&self, _row: &LockRow, _owner: &LockOwner) -> bool {
        true
    }
}
