// rowlock-core/src/lib.rs
// ============================================================================
// Module: Rowlock Core Library
// Description: Public API surface for the Rowlock core.
// Purpose: Expose lock types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Rowlock core provides table-backed mutual exclusion for fleets of
//! processes that share one relational row store and nothing else. All
//! synchronization is derived from atomic conditional row updates plus
//! liveness probing of owning processes; there is no coordination service.
//! Backends integrate through explicit interfaces rather than embedding a
//! specific database driver.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AssumeLocked;
pub use interfaces::CrossHostLockChecker;
pub use interfaces::LockRowStore;
pub use interfaces::ProcessLiveness;
pub use interfaces::StoreError;
pub use runtime::CallbackSink;
pub use runtime::CancelToken;
pub use runtime::ChannelSink;
pub use runtime::EventSeverity;
pub use runtime::EventSink;
pub use runtime::InMemoryLockStore;
pub use runtime::LockContext;
pub use runtime::LockError;
pub use runtime::LockEvent;
pub use runtime::LockHandle;
pub use runtime::LockReaper;
pub use runtime::LockRegistry;
pub use runtime::LockRegistryBuilder;
pub use runtime::LockSettings;
pub use runtime::LockState;
pub use runtime::LogSink;
pub use runtime::NoopSink;
pub use runtime::RegistryBuildError;
pub use runtime::SettingsError;
pub use runtime::SystemProcessLiveness;
pub use runtime::WaitLimit;
