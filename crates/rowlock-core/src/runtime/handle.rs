// rowlock-core/src/runtime/handle.rs
// ============================================================================
// Module: Rowlock Handle
// Description: Per-process lock handle and acquisition driver.
// Purpose: Drive try/blocking acquisition, release, and self-healing.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! A [`LockHandle`] is the process-local view of one lock row. It caches a
//! row snapshot, refreshes it from the store before every decision, and
//! mutates ownership exclusively through the store's conditional update. A
//! read-then-unconditional-write never happens on the owner fields.
//!
//! Acquisition comes in two deliberately distinct operations: `try_acquire`
//! (single shot, never blocks) and `acquire_blocking` (polls under a
//! [`WaitLimit`]). There is no numeric timeout sentinel whose zero value
//! could mean either.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::core::LockCode;
use crate::core::LockOwner;
use crate::core::LockRow;
use crate::core::LockRowId;
use crate::core::Timestamp;
use crate::interfaces::CrossHostLockChecker;
use crate::interfaces::LockRowStore;
use crate::interfaces::ProcessLiveness;
use crate::interfaces::StoreError;
use crate::runtime::events::EventSink;
use crate::runtime::events::LockEvent;
use crate::runtime::reaper;
use crate::runtime::settings::LockSettings;
use crate::runtime::state;
use crate::runtime::state::LockState;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Lock operation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - A store failure is never collapsed into a "lock is free" outcome.
#[derive(Debug, Error)]
pub enum LockError {
    /// Single-shot acquisition lost to a live holder.
    #[error("lock '{code}' is held by another process")]
    Locked {
        /// Code of the contested lock.
        code: LockCode,
    },
    /// Blocking acquisition exceeded its wait limit.
    #[error("acquiring lock '{code}' timed out after {waited:?}")]
    Timeout {
        /// Code of the contested lock.
        code: LockCode,
        /// Wall-clock time spent waiting.
        waited: Duration,
    },
    /// A bounded wait of zero was requested; use `try_acquire` instead.
    #[error("zero wait limit for lock '{code}'; use try_acquire for a single attempt")]
    InvalidTimeout {
        /// Code of the lock the caller addressed.
        code: LockCode,
    },
    /// The cancel token fired while waiting.
    #[error("acquiring lock '{code}' was cancelled")]
    Cancelled {
        /// Code of the lock the caller addressed.
        code: LockCode,
    },
    /// The defensive re-read after a conditional update disagreed with the
    /// expected ownership.
    #[error("lost takeover race for lock '{code}'")]
    RaceLost {
        /// Code of the contested lock.
        code: LockCode,
    },
    /// The backing store failed.
    #[error("lock store failure: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Wait Limit
// ============================================================================

/// How long a blocking acquisition may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitLimit {
    /// Poll until acquired or cancelled, with no deadline.
    Unbounded,
    /// Poll for at most this long. Must be non-zero.
    Bounded(Duration),
}

// ============================================================================
// SECTION: Cancel Token
// ============================================================================

/// Cooperative cancellation flag for blocking acquisition.
///
/// Cloning shares the flag; cancelling any clone cancels every wait using
/// it. Cancellation is observed at the next poll iteration, so it can lag by
/// up to one poll interval.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// Shared cancellation flag.
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every wait sharing this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true when cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

// ============================================================================
// SECTION: Lock Context
// ============================================================================

/// Shared wiring handed to every handle and reaper of one registry.
pub struct LockContext {
    /// Persistence backend for lock rows.
    store: Arc<dyn LockRowStore>,
    /// Identity and liveness interface.
    liveness: Arc<dyn ProcessLiveness>,
    /// Strategy for rows owned by other hosts.
    cross_host: Arc<dyn CrossHostLockChecker>,
    /// Destination for lifecycle events.
    events: Arc<dyn EventSink>,
    /// Validated runtime timings.
    settings: LockSettings,
}

impl LockContext {
    /// Creates a context from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn LockRowStore>,
        liveness: Arc<dyn ProcessLiveness>,
        cross_host: Arc<dyn CrossHostLockChecker>,
        events: Arc<dyn EventSink>,
        settings: LockSettings,
    ) -> Self {
        Self {
            store,
            liveness,
            cross_host,
            events,
            settings,
        }
    }

    /// Returns the persistence backend.
    #[must_use]
    pub fn store(&self) -> &dyn LockRowStore {
        self.store.as_ref()
    }

    /// Returns the liveness interface.
    #[must_use]
    pub fn liveness(&self) -> &dyn ProcessLiveness {
        self.liveness.as_ref()
    }

    /// Returns the cross-host strategy.
    #[must_use]
    pub fn cross_host(&self) -> &dyn CrossHostLockChecker {
        self.cross_host.as_ref()
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    /// Returns the runtime timings.
    #[must_use]
    pub const fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// Returns the identity this process acquires locks under.
    #[must_use]
    pub fn self_owner(&self) -> LockOwner {
        LockOwner::new(self.liveness.current_host(), self.liveness.current_process())
    }
}

// ============================================================================
// SECTION: Lock Handle
// ============================================================================

/// Process-local handle for one lock row.
///
/// # Invariants
/// - The cached snapshot is advisory; every ownership decision re-reads the
///   store first.
/// - Owner fields are mutated only through the store's conditional update
///   or unconditional clear, never via read-modify-write.
pub struct LockHandle {
    /// Shared registry wiring.
    ctx: Arc<LockContext>,
    /// Code this handle is bound to.
    code: LockCode,
    /// Cached row snapshot, refreshed before decisions.
    row: Mutex<LockRow>,
}

impl LockHandle {
    /// Creates a handle over an already-fetched row.
    pub(crate) fn new(ctx: Arc<LockContext>, row: LockRow) -> Self {
        Self {
            ctx,
            code: row.code.clone(),
            row: Mutex::new(row),
        }
    }

    /// Returns the code this handle is bound to.
    #[must_use]
    pub const fn code(&self) -> &LockCode {
        &self.code
    }

    /// Returns the row identifier from the current snapshot.
    #[must_use]
    pub fn row_id(&self) -> LockRowId {
        self.snapshot_guard().id
    }

    /// Returns a copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> LockRow {
        self.snapshot_guard().clone()
    }

    /// Returns true when the snapshot says this process holds the lock.
    ///
    /// This is the registry fast path: it deliberately consults only the
    /// cached snapshot, because a row this process holds cannot be changed
    /// by anyone else through the conditional-update protocol.
    #[must_use]
    pub fn held_by_self(&self) -> bool {
        let me = self.ctx.self_owner();
        self.snapshot_guard().is_owned_by(&me)
    }

    /// Locks the snapshot, recovering from a poisoned mutex.
    fn snapshot_guard(&self) -> MutexGuard<'_, LockRow> {
        self.row.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-reads the row from the store, recreating it when it was reaped.
    pub(crate) fn refresh(&self) -> Result<(), LockError> {
        let fresh = match self.ctx.store().find_by_code(&self.code)? {
            Some(row) => row,
            None => self.ctx.store().create_if_absent(&self.code, Timestamp::now())?,
        };
        *self.snapshot_guard() = fresh;
        Ok(())
    }

    /// Classifies the current snapshot without touching the store.
    fn classify_snapshot(&self) -> LockState {
        let me = self.ctx.self_owner();
        let guard = self.snapshot_guard();
        state::classify(&guard, &me, self.ctx.liveness(), self.ctx.cross_host())
    }

    /// Reports whether the lock is currently held by anyone.
    ///
    /// A row held by a dead peer is self-healed on the spot: ownership is
    /// cleared, a warning event is emitted, and the row reports free. A
    /// dead-peer lock is never left stuck behind a query.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the store cannot be read or healed.
    pub fn is_locked(&self) -> Result<bool, LockError> {
        self.refresh()?;
        match self.classify_snapshot() {
            LockState::Free => Ok(false),
            LockState::Mine | LockState::HeldByLivePeer { .. } => Ok(true),
            LockState::HeldByDeadPeer { owner } => {
                self.heal_dead(&owner)?;
                Ok(false)
            }
        }
    }

    /// Returns the current ownership classification without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the store cannot be read.
    pub fn state(&self) -> Result<LockState, LockError> {
        self.refresh()?;
        Ok(self.classify_snapshot())
    }

    /// Attempts to acquire the lock exactly once, without blocking.
    ///
    /// Re-entrant per process: when this process already holds the row the
    /// call succeeds immediately. A row held by a dead peer is taken over
    /// atomically with a predicate on the dead owner, guarding against the
    /// owner renewing concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Locked`] when a live peer holds the row,
    /// [`LockError::RaceLost`] when a takeover verified sour, or the
    /// underlying [`LockError::Store`] failure.
    pub fn try_acquire(&self) -> Result<(), LockError> {
        self.refresh()?;
        match self.classify_snapshot() {
            LockState::Mine => return Ok(()),
            LockState::HeldByDeadPeer { owner } => {
                if self.takeover(Some(&owner))? {
                    return Ok(());
                }
                // Predicate missed: the owner renewed or a third party won.
            }
            LockState::Free | LockState::HeldByLivePeer { .. } => {}
        }
        if self.is_locked()? {
            return Err(LockError::Locked {
                code: self.code.clone(),
            });
        }
        if self.takeover(None)? {
            return Ok(());
        }
        Err(LockError::Locked {
            code: self.code.clone(),
        })
    }

    /// Acquires the lock, polling until the wait limit expires.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when the bounded limit elapses,
    /// [`LockError::InvalidTimeout`] for a zero bound, or the failures
    /// `try_acquire` surfaces.
    pub fn acquire_blocking(&self, limit: WaitLimit) -> Result<(), LockError> {
        self.acquire_blocking_with(limit, &CancelToken::new())
    }

    /// Acquires the lock, polling until the wait limit expires or the token
    /// is cancelled.
    ///
    /// Before the first wait, the dead-process sweep for the current host
    /// runs once (best effort), so the loop does not sit behind a zombie
    /// owner for a full poll cycle.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Cancelled`] when the token fires, and otherwise
    /// the same failures as [`LockHandle::acquire_blocking`].
    pub fn acquire_blocking_with(
        &self,
        limit: WaitLimit,
        cancel: &CancelToken,
    ) -> Result<(), LockError> {
        if let WaitLimit::Bounded(bound) = limit
            && bound.is_zero()
        {
            return Err(LockError::InvalidTimeout {
                code: self.code.clone(),
            });
        }
        let started = Instant::now();
        if let Err(error) = reaper::sweep_dead_for_host(&self.ctx) {
            self.ctx.events().emit(&LockEvent::SweepFailed {
                message: error.to_string(),
            });
        }
        loop {
            if cancel.is_cancelled() {
                return Err(LockError::Cancelled {
                    code: self.code.clone(),
                });
            }
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(LockError::Locked { .. }) => {}
                // Self-healing freed the row but someone snatched it between
                // the update and the verify read; retry without sleeping.
                Err(LockError::RaceLost { .. }) => continue,
                Err(other) => return Err(other),
            }
            let waited = started.elapsed();
            let nap = match limit {
                WaitLimit::Unbounded => self.ctx.settings().poll_interval(),
                WaitLimit::Bounded(bound) => {
                    if waited >= bound {
                        return Err(LockError::Timeout {
                            code: self.code.clone(),
                            waited,
                        });
                    }
                    self.ctx.settings().poll_interval().min(bound - waited)
                }
            };
            thread::sleep(nap);
        }
    }

    /// Releases the lock unconditionally.
    ///
    /// The clear is keyed by row id alone: a caller releasing a lock it no
    /// longer verifiably owns still clears it. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] when the clear cannot be executed.
    pub fn release(&self) -> Result<(), LockError> {
        let id = self.clear()?;
        self.ctx.events().emit(&LockEvent::Released {
            code: self.code.clone(),
            row_id: id,
        });
        Ok(())
    }

    /// Forcibly releases the lock as an administrative override.
    ///
    /// Same store effect as [`LockHandle::release`]; kept as a distinct
    /// operation so audit trails distinguish an override from a cooperative
    /// unlock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] when the clear cannot be executed.
    pub fn crack(&self) -> Result<(), LockError> {
        let id = self.clear()?;
        self.ctx.events().emit(&LockEvent::Cracked {
            code: self.code.clone(),
            row_id: id,
        });
        Ok(())
    }

    /// Clears ownership in the store, mirrors the clear into the local
    /// snapshot, and returns the row id.
    fn clear(&self) -> Result<LockRowId, LockError> {
        let id = self.row_id();
        self.ctx.store().clear_owner(id)?;
        let mut guard = self.snapshot_guard();
        if guard.id == id {
            guard.owner = None;
            guard.locked_at = None;
        }
        drop(guard);
        Ok(id)
    }

    /// Releases a row held by a confirmed-dead peer and records the event.
    fn heal_dead(&self, owner: &LockOwner) -> Result<(), LockError> {
        let locked_at = self.snapshot_guard().locked_at;
        let id = self.clear()?;
        self.ctx.events().emit(&LockEvent::DeadOwnerReleased {
            code: self.code.clone(),
            row_id: id,
            owner: owner.clone(),
            locked_at,
        });
        Ok(())
    }

    /// Runs one conditional owner update and verifies it with a re-read.
    ///
    /// Returns `Ok(true)` on verified success and `Ok(false)` when the
    /// predicate matched no row. A successful update whose re-read does not
    /// show this process as owner fails with [`LockError::RaceLost`]; with a
    /// truly atomic backing update that cannot happen, but success is never
    /// assumed without the check.
    fn takeover(&self, expected: Option<&LockOwner>) -> Result<bool, LockError> {
        let id = self.row_id();
        let me = self.ctx.self_owner();
        let affected =
            self.ctx.store().conditional_update_owner(id, expected, &me, Timestamp::now())?;
        if affected == 0 {
            return Ok(false);
        }
        self.refresh()?;
        if self.snapshot_guard().is_owned_by(&me) {
            self.ctx.events().emit(&LockEvent::Acquired {
                code: self.code.clone(),
                row_id: id,
                owner: me,
            });
            Ok(true)
        } else {
            Err(LockError::RaceLost {
                code: self.code.clone(),
            })
        }
    }
}
