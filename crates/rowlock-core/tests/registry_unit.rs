// crates/rowlock-core/tests/registry_unit.rs
// ============================================================================
// Module: Lock Registry Unit Tests
// Description: Handle memoization, freshness, and builder tests.
// Purpose: Validate one-handle-per-code semantics and registry wiring.
// ============================================================================

//! ## Overview
//! Exercises handle identity, the held-by-self fast path, snapshot
//! freshness for cached handles, recreation of reaped rows, and builder
//! validation.

#![allow(dead_code, reason = "Common module may have unused helpers.")]
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

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::CountingStore;
use common::FakeLiveness;
use common::fast_settings;
use common::registry_for;
use rowlock_core::InMemoryLockStore;
use rowlock_core::LockCode;
use rowlock_core::LockRegistry;
use rowlock_core::LockRowStore;
use rowlock_core::LockSettings;
use rowlock_core::RegistryBuildError;
use rowlock_core::Timestamp;

/// Tests that repeated `instance` calls return the same handle and the same
/// persisted row id.
#[test]
fn instance_memoizes_one_handle_per_code() {
    let store = InMemoryLockStore::new();
    let liveness = FakeLiveness::new("host-a", 11);
    let registry = registry_for(&store, &liveness);
    let code = LockCode::new("cron:nightly");

    let first = registry.instance(&code).unwrap();
    let second = registry.instance(&code).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.row_id(), second.row_id());
}

/// Tests that two registries over one store resolve a code to the same
/// persisted row.
#[test]
fn instance_is_find_or_create_across_processes() {
    let store = InMemoryLockStore::new();
    let liveness_a = FakeLiveness::new("host-a", 1);
    let liveness_b = FakeLiveness::new("host-b", 2);
    let registry_a = registry_for(&store, &liveness_a);
    let registry_b = registry_for(&store, &liveness_b);
    let code = LockCode::new("cron:nightly");

    let handle_a = registry_a.instance(&code).unwrap();
    let handle_b = registry_b.instance(&code).unwrap();

    assert_eq!(handle_a.row_id(), handle_b.row_id());
}

/// Tests that distinct codes map to distinct rows.
#[test]
fn distinct_codes_get_distinct_rows() {
    let store = InMemoryLockStore::new();
    let liveness = FakeLiveness::new("host-a", 11);
    let registry = registry_for(&store, &liveness);

    let first = registry.instance(&LockCode::new("jobs:payroll")).unwrap();
    let second = registry.instance(&LockCode::new("cron:nightly")).unwrap();

    assert_ne!(first.row_id(), second.row_id());
}

/// Tests the fast path: a cached handle held by this process is returned
/// without any store round-trip.
#[test]
fn instance_skips_the_store_while_held() {
    let store = CountingStore::new(InMemoryLockStore::new());
    let liveness = FakeLiveness::new("host-a", 11);
    let registry = LockRegistry::builder()
        .store(store.clone())
        .liveness(liveness)
        .settings(fast_settings())
        .build()
        .unwrap();
    let code = LockCode::new("cron:nightly");

    let handle = registry.instance(&code).unwrap();
    handle.try_acquire().unwrap();

    let before = store.round_trips();
    let cached = registry.instance(&code).unwrap();
    assert!(Arc::ptr_eq(&handle, &cached));
    assert_eq!(store.round_trips(), before, "fast path must not touch the store");
}

/// Tests that a cached handle not held by this process is refreshed, so a
/// peer's acquisition becomes visible.
#[test]
fn instance_refreshes_stale_cached_handles() {
    let store = InMemoryLockStore::new();
    let liveness_a = FakeLiveness::new("host-a", 1);
    let liveness_b = FakeLiveness::new("host-b", 2);
    let registry_a = registry_for(&store, &liveness_a);
    let registry_b = registry_for(&store, &liveness_b);
    let code = LockCode::new("cron:nightly");

    let handle_a = registry_a.instance(&code).unwrap();
    assert!(handle_a.snapshot().is_free());

    registry_b.instance(&code).unwrap().try_acquire().unwrap();

    let refreshed = registry_a.instance(&code).unwrap();
    assert_eq!(refreshed.snapshot().owner, Some(liveness_b.me()));
}

/// Tests that a reaped row is recreated when its cached handle is fetched
/// again.
#[test]
fn instance_recreates_reaped_rows() {
    let store = InMemoryLockStore::new();
    let liveness = FakeLiveness::new("host-a", 11);
    let registry = registry_for(&store, &liveness);
    let code = LockCode::new("cron:nightly");

    registry.instance(&code).unwrap();

    // Sweep everything regardless of age: every free row is deleted.
    let future = Timestamp::now().later_by(Duration::from_secs(3_600));
    assert_eq!(store.delete_unused_before(future).unwrap(), 1);
    assert!(store.find_by_code(&code).unwrap().is_none());

    let handle = registry.instance(&code).unwrap();
    assert!(store.find_by_code(&code).unwrap().is_some());
    assert!(handle.snapshot().is_free());
}

/// Tests that the builder rejects a registry without a store.
#[test]
fn builder_requires_a_store() {
    let result = LockRegistry::builder().liveness(FakeLiveness::new("host-a", 1)).build();
    assert!(matches!(result, Err(RegistryBuildError::MissingStore)));
}

/// Tests that the builder rejects a registry without liveness.
#[test]
fn builder_requires_liveness() {
    let result = LockRegistry::builder().store(InMemoryLockStore::new()).build();
    assert!(matches!(result, Err(RegistryBuildError::MissingLiveness)));
}

/// Tests that the builder rejects zero-valued settings.
#[test]
fn builder_rejects_invalid_settings() {
    let settings = LockSettings {
        poll_interval_ms: 0,
        ..LockSettings::default()
    };
    let result = LockRegistry::builder()
        .store(InMemoryLockStore::new())
        .liveness(FakeLiveness::new("host-a", 1))
        .settings(settings)
        .build();
    assert!(matches!(result, Err(RegistryBuildError::InvalidSettings(_))));
}
