// rowlock-core/src/runtime/reaper.rs
// ============================================================================
// Module: Rowlock Reaper
// Description: Periodic sweeps over the lock table.
// Purpose: Delete abandoned free rows and release dead or dangling owners.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Three sweeps keep the lock table healthy: unused free rows are deleted
//! after a retention window, rows held by dead processes on the current host
//! are released, and rows held by hosts that left the cluster are released
//! (never deleted). Sweeps are idempotent and safe to run concurrently from
//! every host. Inside a sweep the policy is log-and-continue: one bad row
//! emits an event and the scan moves on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::Timestamp;
use crate::interfaces::StoreError;
use crate::runtime::events::LockEvent;
use crate::runtime::handle::LockContext;

// ============================================================================
// SECTION: Reaper
// ============================================================================

/// Periodic sweep jobs over the lock table.
///
/// Obtained from [`crate::runtime::LockRegistry::reaper`] so it shares the
/// registry's store, liveness, and event wiring. An external scheduler is
/// expected to invoke the sweeps: `delete_unused` coarsely (hourly),
/// `release_dead_processes` and `release_dangling` finely (per minute).
pub struct LockReaper {
    /// Shared registry wiring.
    ctx: Arc<LockContext>,
}

impl LockReaper {
    /// Creates a reaper over the provided wiring.
    #[must_use]
    pub const fn new(ctx: Arc<LockContext>) -> Self {
        Self { ctx }
    }

    /// Deletes free rows whose `used_at` is older than the retention window.
    ///
    /// Pure garbage collection of lock codes nobody recreated. The store
    /// predicate itself restricts the delete to free rows, so a held row
    /// survives regardless of its age. Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete cannot be executed.
    pub fn delete_unused(&self) -> Result<u64, StoreError> {
        let cutoff = Timestamp::now().earlier_by(self.ctx.settings().unused_retention());
        let deleted = self.ctx.store().delete_unused_before(cutoff)?;
        self.ctx.events().emit(&LockEvent::UnusedSwept { deleted, cutoff });
        Ok(deleted)
    }

    /// Releases rows on the current host whose owner process is dead.
    ///
    /// Scoped to the current host because pids are only probeable locally.
    /// Only rows locked longer ago than the dead-process timeout are probed,
    /// so a freshly acquired lock is never second-guessed. Returns the
    /// number of rows released.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the candidate scan fails; per-row clear
    /// failures are reported through the event sink and skipped.
    pub fn release_dead_processes(&self) -> Result<u64, StoreError> {
        sweep_dead_for_host(&self.ctx)
    }

    /// Releases rows owned by hosts absent from the valid-host set.
    ///
    /// The rows themselves survive: a dangling lock is an ownership problem,
    /// not a garbage row. Every release event carries the valid-host set for
    /// audit. Returns the number of rows released.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the host scan fails; per-host and per-row
    /// failures are reported through the event sink and skipped.
    pub fn release_dangling(&self) -> Result<u64, StoreError> {
        let valid = self.ctx.liveness().valid_hosts();
        let owners = self.ctx.store().distinct_owner_hosts()?;
        let mut released = 0;
        for host in owners.difference(&valid) {
            let rows = match self.ctx.store().owned_by_host(host) {
                Ok(rows) => rows,
                Err(error) => {
                    self.ctx.events().emit(&LockEvent::SweepFailed {
                        message: error.to_string(),
                    });
                    continue;
                }
            };
            for row in rows {
                match self.ctx.store().clear_owner(row.id) {
                    Ok(()) => {
                        released += 1;
                        self.ctx.events().emit(&LockEvent::DanglingReleased {
                            code: row.code.clone(),
                            row_id: row.id,
                            owner_host: host.clone(),
                            valid_hosts: valid.clone(),
                        });
                    }
                    Err(error) => {
                        self.ctx.events().emit(&LockEvent::SweepRowFailed {
                            code: row.code.clone(),
                            row_id: row.id,
                            message: error.to_string(),
                        });
                    }
                }
            }
        }
        Ok(released)
    }
}

// ============================================================================
// SECTION: Shared Sweep
// ============================================================================

/// Releases rows on the current host whose owner process is dead.
///
/// Shared between [`LockReaper::release_dead_processes`] and the blocking
/// acquisition entry, which runs it once before waiting.
pub(crate) fn sweep_dead_for_host(ctx: &LockContext) -> Result<u64, StoreError> {
    let host = ctx.liveness().current_host();
    let cutoff = Timestamp::now().earlier_by(ctx.settings().dead_process_timeout());
    let rows = ctx.store().owned_by_host_locked_before(&host, cutoff)?;
    let mut released = 0;
    for row in rows {
        let Some(owner) = row.owner.clone() else {
            continue;
        };
        if ctx.liveness().is_process_alive(&owner.host, owner.process) {
            continue;
        }
        match ctx.store().clear_owner(row.id) {
            Ok(()) => {
                released += 1;
                ctx.events().emit(&LockEvent::DeadOwnerReleased {
                    code: row.code.clone(),
                    row_id: row.id,
                    owner,
                    locked_at: row.locked_at,
                });
            }
            Err(error) => {
                ctx.events().emit(&LockEvent::SweepRowFailed {
                    code: row.code.clone(),
                    row_id: row.id,
                    message: error.to_string(),
                });
            }
        }
    }
    Ok(released)
}
