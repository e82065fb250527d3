// rowlock-core/src/runtime/liveness.rs
// ============================================================================
// Module: Rowlock System Liveness
// Description: Operating-system backed liveness implementation.
// Purpose: Answer identity and pid-liveness questions for single-host use.
// Dependencies: crate::{core, interfaces}, hostname, std
// ============================================================================

//! ## Overview
//! [`SystemProcessLiveness`] derives the host identity from the machine
//! hostname and probes same-host pids through the OS. Remote pids cannot be
//! probed from here, so they are reported alive; the cross-host strategy on
//! the registry decides what to do with remote owners. `valid_hosts` covers
//! only the current host — cluster deployments supply an implementation
//! backed by their host registry instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use crate::core::HostId;
use crate::core::ProcessId;
use crate::interfaces::ProcessLiveness;

// ============================================================================
// SECTION: System Liveness
// ============================================================================

/// Liveness implementation backed by the operating system.
#[derive(Debug, Clone)]
pub struct SystemProcessLiveness {
    /// Host identity resolved once at construction.
    host: HostId,
}

impl Default for SystemProcessLiveness {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessLiveness {
    /// Creates a liveness implementation for the current machine.
    ///
    /// The hostname is resolved once; machines that cannot report one are
    /// identified as `localhost`.
    #[must_use]
    pub fn new() -> Self {
        let host = hostname::get()
            .map(|name| HostId::new(name.to_string_lossy()))
            .unwrap_or_else(|_| HostId::new("localhost"));
        Self { host }
    }

    /// Creates a liveness implementation with an explicit host identity.
    ///
    /// Useful when the cluster addresses machines by something other than
    /// their OS hostname.
    #[must_use]
    pub const fn with_host(host: HostId) -> Self {
        Self { host }
    }
}

impl ProcessLiveness for SystemProcessLiveness {
    fn current_host(&self) -> HostId {
        self.host.clone()
    }

    fn current_process(&self) -> ProcessId {
        ProcessId::new(std::process::id())
    }

    fn is_process_alive(&self, host: &HostId, process: ProcessId) -> bool {
        if host == &self.host {
            probe_local_process(process)
        } else {
            // Remote pids cannot be probed from here; answer conservatively
            // and leave remote owners to the cross-host strategy.
            true
        }
    }

    fn valid_hosts(&self) -> BTreeSet<HostId> {
        BTreeSet::from([self.host.clone()])
    }
}

// ============================================================================
// SECTION: Local Probe
// ============================================================================

/// Probes a pid on the current machine via the proc filesystem.
#[cfg(target_os = "linux")]
fn probe_local_process(process: ProcessId) -> bool {
    std::path::Path::new("/proc").join(process.get().to_string()).exists()
}

/// Probes a pid on the current machine.
///
/// Platforms without a proc filesystem report every pid alive; dead-owner
/// takeover then relies on the reaper timeouts of a liveness implementation
/// that can actually probe.
#[cfg(not(target_os = "linux"))]
fn probe_local_process(_process: ProcessId) -> bool {
    true
}
