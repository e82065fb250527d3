// rowlock-core/src/runtime/state.rs
// ============================================================================
// Module: Rowlock State Machine
// Description: Ownership classification of a lock row snapshot.
// Purpose: Decide free / mine / live-peer / dead-peer for the driver.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Classification is the heart of the lock subsystem: given a row snapshot
//! and the liveness interface, exactly one of four states holds. Same-host
//! owners are probed directly by pid; remote owners are delegated to the
//! pluggable [`CrossHostLockChecker`], which defaults to assuming the peer
//! still holds its lock. Classification itself is read-only; the self-healing
//! release of dead peers happens in the acquisition driver.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::LockOwner;
use crate::core::LockRow;
use crate::interfaces::CrossHostLockChecker;
use crate::interfaces::ProcessLiveness;

// ============================================================================
// SECTION: Lock State
// ============================================================================

/// Ownership state of a lock row from the viewpoint of one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// The row has no owner.
    Free,
    /// The row is owned by this process on this host.
    Mine,
    /// The row is owned by a peer believed to be alive.
    HeldByLivePeer {
        /// The live peer holding the row.
        owner: LockOwner,
    },
    /// The row is owned by a peer confirmed or presumed dead.
    HeldByDeadPeer {
        /// The dead peer still recorded on the row.
        owner: LockOwner,
    },
}

impl LockState {
    /// Returns true when the state means the row is held by anyone,
    /// including this process.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Classifies a row snapshot against the current identity and liveness.
#[must_use]
pub fn classify(
    row: &LockRow,
    me: &LockOwner,
    liveness: &dyn ProcessLiveness,
    cross_host: &dyn CrossHostLockChecker,
) -> LockState {
    let Some(owner) = row.owner.as_ref() else {
        return LockState::Free;
    };
    if owner == me {
        return LockState::Mine;
    }
    let held = if owner.host == me.host {
        liveness.is_process_alive(&owner.host, owner.process)
    } else {
        cross_host.peer_holds_lock(row, owner)
    };
    if held {
        LockState::HeldByLivePeer {
            owner: owner.clone(),
        }
    } else {
        LockState::HeldByDeadPeer {
            owner: owner.clone(),
        }
    }
}
