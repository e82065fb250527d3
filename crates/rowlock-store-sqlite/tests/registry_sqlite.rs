// crates/rowlock-store-sqlite/tests/registry_sqlite.rs
// ============================================================================
// Module: Registry Over SQLite Tests
// Description: End-to-end lock semantics on the durable store.
// Purpose: Validate mutual exclusion and takeover against SQLite.
// ============================================================================

//! ## Overview
//! Drives the full registry/handle stack against the `SQLite` store with two
//! simulated process identities sharing one database file.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;

use rowlock_core::HostId;
use rowlock_core::LockCode;
use rowlock_core::LockError;
use rowlock_core::LockOwner;
use rowlock_core::LockRegistry;
use rowlock_core::ProcessId;
use rowlock_core::ProcessLiveness;
use rowlock_store_sqlite::SqliteLockStore;
use rowlock_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Minimal liveness fake pinned to one identity with a fixed alive set.
#[derive(Debug, Clone)]
struct PinnedLiveness {
    /// Identity this fake reports for the current process.
    me: LockOwner,
    /// Pids on the local host considered alive.
    alive: BTreeSet<u32>,
}

impl PinnedLiveness {
    /// Creates a fake whose own pid is alive.
    fn new(host: &str, pid: u32) -> Self {
        Self {
            me: LockOwner::new(HostId::new(host), ProcessId::new(pid)),
            alive: BTreeSet::from([pid]),
        }
    }
}

impl ProcessLiveness for PinnedLiveness {
    fn current_host(&self) -> HostId {
        self.me.host.clone()
    }

    fn current_process(&self) -> ProcessId {
        self.me.process
    }

    fn is_process_alive(&self, host: &HostId, process: ProcessId) -> bool {
        host == &self.me.host && self.alive.contains(&process.get())
    }

    fn valid_hosts(&self) -> BTreeSet<HostId> {
        BTreeSet::from([self.me.host.clone()])
    }
}

/// Builds a registry over the shared database for one identity.
fn registry(store: &SqliteLockStore, host: &str, pid: u32) -> LockRegistry {
    LockRegistry::builder()
        .store(store.clone())
        .liveness(PinnedLiveness::new(host, pid))
        .build()
        .unwrap()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests mutual exclusion and handover across two identities sharing one
/// database file.
#[test]
fn registries_exclude_each_other_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let store =
        SqliteLockStore::open(&SqliteStoreConfig::new(dir.path().join("locks.db"))).unwrap();
    let registry_a = registry(&store, "host-a", 1);
    let registry_b = registry(&store, "host-b", 2);
    let code = LockCode::new("cron:nightly");

    let handle_a = registry_a.instance(&code).unwrap();
    let handle_b = registry_b.instance(&code).unwrap();
    assert_eq!(handle_a.row_id(), handle_b.row_id());

    handle_a.try_acquire().unwrap();
    assert!(matches!(handle_b.try_acquire(), Err(LockError::Locked { .. })));

    handle_a.release().unwrap();
    handle_b.try_acquire().unwrap();

    let row = handle_b.snapshot();
    assert_eq!(row.owner, Some(LockOwner::new(HostId::new("host-b"), ProcessId::new(2))));
}

/// Tests dead-owner takeover on the durable store: a same-host row whose
/// owner pid is gone is taken over by the next caller.
#[test]
fn dead_owner_takeover_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let store =
        SqliteLockStore::open(&SqliteStoreConfig::new(dir.path().join("locks.db"))).unwrap();
    let code = LockCode::new("jobs:payroll");

    registry(&store, "host-a", 99).instance(&code).unwrap().try_acquire().unwrap();

    // A new process on the same host; pid 99 is not in its alive set.
    let successor = registry(&store, "host-a", 11);
    let handle = successor.instance(&code).unwrap();
    handle.try_acquire().unwrap();

    let row = handle.snapshot();
    assert_eq!(row.owner, Some(LockOwner::new(HostId::new("host-a"), ProcessId::new(11))));
}
