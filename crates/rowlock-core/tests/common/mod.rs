// crates/rowlock-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared helpers for rowlock-core tests.
// Purpose: Provide fake liveness, instrumented stores, and registry builders.
// Dependencies: rowlock-core
// ============================================================================

//! ## Overview
//! Provides a controllable liveness fake, capturing event sink, instrumented
//! store wrappers, and registry builders shared across the core test suite.

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
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use rowlock_core::EventSink;
use rowlock_core::HostId;
use rowlock_core::InMemoryLockStore;
use rowlock_core::LockCode;
use rowlock_core::LockEvent;
use rowlock_core::LockOwner;
use rowlock_core::LockRegistry;
use rowlock_core::LockRow;
use rowlock_core::LockRowId;
use rowlock_core::LockRowStore;
use rowlock_core::LockSettings;
use rowlock_core::ProcessId;
use rowlock_core::ProcessLiveness;
use rowlock_core::StoreError;
use rowlock_core::Timestamp;

// ============================================================================
// SECTION: Fake Liveness
// ============================================================================

/// Shared mutable state of a [`FakeLiveness`].
#[derive(Debug)]
struct FakeLivenessState {
    /// Set of (host, pid) pairs considered alive.
    alive: BTreeSet<(HostId, u32)>,
    /// Hosts considered part of the cluster.
    valid: BTreeSet<HostId>,
}

/// Controllable liveness fake identifying as one (host, pid) pair.
#[derive(Debug, Clone)]
pub struct FakeLiveness {
    /// Identity this fake reports for the current process.
    me: LockOwner,
    /// Mutable alive/valid sets shared across clones.
    state: Arc<Mutex<FakeLivenessState>>,
}

impl FakeLiveness {
    /// Creates a fake identifying as `host`/`pid`, alive, on a valid host.
    pub fn new(host: &str, pid: u32) -> Self {
        let host = HostId::new(host);
        let mut alive = BTreeSet::new();
        alive.insert((host.clone(), pid));
        let mut valid = BTreeSet::new();
        valid.insert(host.clone());
        Self {
            me: LockOwner::new(host, ProcessId::new(pid)),
            state: Arc::new(Mutex::new(FakeLivenessState { alive, valid })),
        }
    }

    /// Returns the owner identity this fake acquires locks under.
    pub fn me(&self) -> LockOwner {
        self.me.clone()
    }

    /// Marks a (host, pid) pair alive.
    pub fn mark_alive(&self, host: &str, pid: u32) {
        self.state.lock().unwrap().alive.insert((HostId::new(host), pid));
    }

    /// Marks a (host, pid) pair dead.
    pub fn mark_dead(&self, host: &str, pid: u32) {
        self.state.lock().unwrap().alive.remove(&(HostId::new(host), pid));
    }

    /// Replaces the valid-host set.
    pub fn set_valid_hosts(&self, hosts: &[&str]) {
        let mut guard = self.state.lock().unwrap();
        guard.valid = hosts.iter().map(|host| HostId::new(*host)).collect();
    }
}

impl ProcessLiveness for FakeLiveness {
    fn current_host(&self) -> HostId {
        self.me.host.clone()
    }

    fn current_process(&self) -> ProcessId {
        self.me.process
    }

    fn is_process_alive(&self, host: &HostId, process: ProcessId) -> bool {
        self.state.lock().unwrap().alive.contains(&(host.clone(), process.get()))
    }

    fn valid_hosts(&self) -> BTreeSet<HostId> {
        self.state.lock().unwrap().valid.clone()
    }
}

// ============================================================================
// SECTION: Capturing Sink
// ============================================================================

/// Event sink that records every event into a shared vector.
#[derive(Debug, Clone, Default)]
pub struct CapturingSink {
    /// Recorded events in emission order.
    events: Arc<Mutex<Vec<LockEvent>>>,
}

impl CapturingSink {
    /// Creates an empty capturing sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    pub fn events(&self) -> Vec<LockEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for CapturingSink {
    fn emit(&self, event: &LockEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Instrumented Stores
// ============================================================================

/// Store wrapper counting read and create traffic.
#[derive(Debug, Clone)]
pub struct CountingStore {
    /// Wrapped in-memory store.
    inner: InMemoryLockStore,
    /// Number of `find_by_code` calls.
    finds: Arc<AtomicU64>,
    /// Number of `create_if_absent` calls.
    creates: Arc<AtomicU64>,
}

impl CountingStore {
    /// Wraps an in-memory store.
    pub fn new(inner: InMemoryLockStore) -> Self {
        Self {
            inner,
            finds: Arc::new(AtomicU64::new(0)),
            creates: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the combined number of reads and creates so far.
    pub fn round_trips(&self) -> u64 {
        self.finds.load(Ordering::SeqCst) + self.creates.load(Ordering::SeqCst)
    }
}

impl LockRowStore for CountingStore {
    fn find_by_code(&self, code: &LockCode) -> Result<Option<LockRow>, StoreError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_code(code)
    }

    fn create_if_absent(&self, code: &LockCode, now: Timestamp) -> Result<LockRow, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_if_absent(code, now)
    }

    fn conditional_update_owner(
        &self,
        id: LockRowId,
        expected: Option<&LockOwner>,
        new_owner: &LockOwner,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        self.inner.conditional_update_owner(id, expected, new_owner, now)
    }

    fn clear_owner(&self, id: LockRowId) -> Result<(), StoreError> {
        self.inner.clear_owner(id)
    }

    fn delete_unused_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        self.inner.delete_unused_before(cutoff)
    }

    fn distinct_owner_hosts(&self) -> Result<BTreeSet<HostId>, StoreError> {
        self.inner.distinct_owner_hosts()
    }

    fn owned_by_host(&self, host: &HostId) -> Result<Vec<LockRow>, StoreError> {
        self.inner.owned_by_host(host)
    }

    fn owned_by_host_locked_before(
        &self,
        host: &HostId,
        cutoff: Timestamp,
    ) -> Result<Vec<LockRow>, StoreError> {
        self.inner.owned_by_host_locked_before(host, cutoff)
    }
}

/// Store wrapper that can be switched into a failing mode.
#[derive(Debug, Clone)]
pub struct FailingStore {
    /// Wrapped in-memory store.
    inner: InMemoryLockStore,
    /// When set, every operation fails with `Unavailable`.
    failing: Arc<AtomicBool>,
}

impl FailingStore {
    /// Wraps an in-memory store in healthy mode.
    pub fn new(inner: InMemoryLockStore) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Switches the store into or out of failing mode.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fails when the store is in failing mode.
    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected store failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl LockRowStore for FailingStore {
    fn find_by_code(&self, code: &LockCode) -> Result<Option<LockRow>, StoreError> {
        self.check()?;
        self.inner.find_by_code(code)
    }

    fn create_if_absent(&self, code: &LockCode, now: Timestamp) -> Result<LockRow, StoreError> {
        self.check()?;
        self.inner.create_if_absent(code, now)
    }

    fn conditional_update_owner(
        &self,
        id: LockRowId,
        expected: Option<&LockOwner>,
        new_owner: &LockOwner,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.conditional_update_owner(id, expected, new_owner, now)
    }

    fn clear_owner(&self, id: LockRowId) -> Result<(), StoreError> {
        self.check()?;
        self.inner.clear_owner(id)
    }

    fn delete_unused_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.delete_unused_before(cutoff)
    }

    fn distinct_owner_hosts(&self) -> Result<BTreeSet<HostId>, StoreError> {
        self.check()?;
        self.inner.distinct_owner_hosts()
    }

    fn owned_by_host(&self, host: &HostId) -> Result<Vec<LockRow>, StoreError> {
        self.check()?;
        self.inner.owned_by_host(host)
    }

    fn owned_by_host_locked_before(
        &self,
        host: &HostId,
        cutoff: Timestamp,
    ) -> Result<Vec<LockRow>, StoreError> {
        self.check()?;
        self.inner.owned_by_host_locked_before(host, cutoff)
    }
}

// ============================================================================
// SECTION: Shared Buffer
// ============================================================================

/// Cloneable in-memory writer for log sink assertions.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    /// Accumulated bytes.
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer contents as a lossy string.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock().unwrap()).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Registry Builders
// ============================================================================

/// Settings tuned for fast-polling tests.
pub fn fast_settings() -> LockSettings {
    LockSettings {
        poll_interval_ms: 25,
        dead_process_timeout_secs: 100,
        unused_retention_secs: 86_400,
    }
}

/// Builds a registry over the shared store for the given identity.
pub fn registry_for(store: &InMemoryLockStore, liveness: &FakeLiveness) -> LockRegistry {
    LockRegistry::builder()
        .store(store.clone())
        .liveness(liveness.clone())
        .settings(fast_settings())
        .build()
        .unwrap()
}

/// Builds a registry that also captures events.
pub fn registry_with_events(
    store: &InMemoryLockStore,
    liveness: &FakeLiveness,
    sink: &CapturingSink,
) -> LockRegistry {
    LockRegistry::builder()
        .store(store.clone())
        .liveness(liveness.clone())
        .events(sink.clone())
        .settings(fast_settings())
        .build()
        .unwrap()
}
