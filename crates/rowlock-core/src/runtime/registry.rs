// rowlock-core/src/runtime/registry.rs
// ============================================================================
// Module: Rowlock Registry
// Description: Process-local cache of lock handles keyed by code.
// Purpose: Guarantee one handle per code per process.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The registry memoizes one [`LockHandle`] per lock code so that every
//! caller in a process shares one coherent view of each row. It is an
//! explicit object injected where needed, not a process-wide singleton;
//! separate registries over the same store behave like separate processes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use thiserror::Error;

use crate::core::LockCode;
use crate::core::Timestamp;
use crate::interfaces::AssumeLocked;
use crate::interfaces::CrossHostLockChecker;
use crate::interfaces::LockRowStore;
use crate::interfaces::ProcessLiveness;
use crate::runtime::events::EventSink;
use crate::runtime::events::NoopSink;
use crate::runtime::handle::LockContext;
use crate::runtime::handle::LockError;
use crate::runtime::handle::LockHandle;
use crate::runtime::reaper::LockReaper;
use crate::runtime::settings::LockSettings;
use crate::runtime::settings::SettingsError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry construction errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RegistryBuildError {
    /// No lock row store was configured.
    #[error("lock registry requires a store")]
    MissingStore,
    /// No liveness implementation was configured.
    #[error("lock registry requires a liveness implementation")]
    MissingLiveness,
    /// The provided settings failed validation.
    #[error("lock registry settings rejected: {0}")]
    InvalidSettings(#[from] SettingsError),
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for a lock registry.
///
/// # Invariants
/// - `build` succeeds only when a store and a liveness implementation are
///   configured and the settings validate.
#[derive(Default)]
pub struct LockRegistryBuilder {
    /// Persistence backend for lock rows.
    store: Option<Arc<dyn LockRowStore>>,
    /// Identity and liveness interface.
    liveness: Option<Arc<dyn ProcessLiveness>>,
    /// Strategy for rows owned by other hosts.
    cross_host: Option<Arc<dyn CrossHostLockChecker>>,
    /// Destination for lifecycle events.
    events: Option<Arc<dyn EventSink>>,
    /// Runtime timings.
    settings: Option<LockSettings>,
}

impl LockRegistryBuilder {
    /// Registers the lock row store.
    #[must_use]
    pub fn store(mut self, store: impl LockRowStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Registers the liveness implementation.
    #[must_use]
    pub fn liveness(mut self, liveness: impl ProcessLiveness + 'static) -> Self {
        self.liveness = Some(Arc::new(liveness));
        self
    }

    /// Registers the cross-host strategy (default: [`AssumeLocked`]).
    #[must_use]
    pub fn cross_host(mut self, checker: impl CrossHostLockChecker + 'static) -> Self {
        self.cross_host = Some(Arc::new(checker));
        self
    }

    /// Registers the event sink (default: [`NoopSink`]).
    #[must_use]
    pub fn events(mut self, sink: impl EventSink + 'static) -> Self {
        self.events = Some(Arc::new(sink));
        self
    }

    /// Overrides the runtime timings (default: [`LockSettings::default`]).
    #[must_use]
    pub fn settings(mut self, settings: LockSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryBuildError`] when a required collaborator is
    /// missing or the settings fail validation.
    pub fn build(self) -> Result<LockRegistry, RegistryBuildError> {
        let store = self.store.ok_or(RegistryBuildError::MissingStore)?;
        let liveness = self.liveness.ok_or(RegistryBuildError::MissingLiveness)?;
        let settings = self.settings.unwrap_or_default();
        settings.validate()?;
        let cross_host = self.cross_host.unwrap_or_else(|| Arc::new(AssumeLocked));
        let events = self.events.unwrap_or_else(|| Arc::new(NoopSink));
        Ok(LockRegistry {
            ctx: Arc::new(LockContext::new(store, liveness, cross_host, events, settings)),
            handles: Mutex::new(BTreeMap::new()),
        })
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Process-local lock handle cache.
///
/// # Invariants
/// - At most one handle exists per code; repeated `instance` calls return
///   the same `Arc`.
pub struct LockRegistry {
    /// Shared wiring handed to handles and reapers.
    ctx: Arc<LockContext>,
    /// Handle cache keyed by lock code.
    handles: Mutex<BTreeMap<LockCode, Arc<LockHandle>>>,
}

impl LockRegistry {
    /// Returns a builder for the registry.
    #[must_use]
    pub fn builder() -> LockRegistryBuilder {
        LockRegistryBuilder::default()
    }

    /// Returns the handle for `code`, creating the row when absent.
    ///
    /// A cached handle currently held by this process is returned without
    /// touching the store. A cached handle in any other state is refreshed
    /// first, because peers may have changed the row (or a reaper may have
    /// deleted it, in which case it is recreated). Creation races between
    /// processes resolve inside the store's find-or-create.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the row cannot be fetched or created.
    pub fn instance(&self, code: &LockCode) -> Result<Arc<LockHandle>, LockError> {
        let mut guard = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = guard.get(code) {
            let handle = Arc::clone(handle);
            drop(guard);
            if !handle.held_by_self() {
                handle.refresh()?;
            }
            return Ok(handle);
        }
        // Creation happens under the cache lock so two callers racing on the
        // same code cannot end up with two distinct handles.
        let row = self.ctx.store().create_if_absent(code, Timestamp::now())?;
        let handle = Arc::new(LockHandle::new(Arc::clone(&self.ctx), row));
        guard.insert(code.clone(), Arc::clone(&handle));
        drop(guard);
        Ok(handle)
    }

    /// Returns a reaper sharing this registry's wiring.
    #[must_use]
    pub fn reaper(&self) -> LockReaper {
        LockReaper::new(Arc::clone(&self.ctx))
    }

    /// Returns the shared wiring, for embedding beyond the registry.
    #[must_use]
    pub const fn context(&self) -> &Arc<LockContext> {
        &self.ctx
    }
}
