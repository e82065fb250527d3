// rowlock-core/src/runtime/events.rs
// ============================================================================
// Module: Rowlock Event Sinks
// Description: Structured lock lifecycle events and sink implementations.
// Purpose: Surface acquisitions, releases, and reaper actions for audit.
// Dependencies: crate::core, serde, serde_json, std
// ============================================================================

//! ## Overview
//! Lock operations report what they did through an [`EventSink`] rather than
//! a global logger. Emission is best-effort: a sink failure never fails the
//! lock operation that produced the event. Reference sinks cover the common
//! wirings: discard, channel, callback, and JSON-lines log output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc::Sender;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

use crate::core::HostId;
use crate::core::LockCode;
use crate::core::LockOwner;
use crate::core::LockRowId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Severity attached to a lock event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    /// Routine lifecycle event.
    Info,
    /// Event that indicates a peer failure or an administrative override.
    Warning,
}

impl EventSeverity {
    /// Returns the canonical label for the severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }
}

/// Structured lock lifecycle event.
///
/// # Invariants
/// - Events describe completed store mutations, never intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LockEvent {
    /// A lock was acquired by this process.
    Acquired {
        /// Code of the acquired lock.
        code: LockCode,
        /// Row identifier of the acquired lock.
        row_id: LockRowId,
        /// New owner of the row.
        owner: LockOwner,
    },
    /// A lock was released by its holder.
    Released {
        /// Code of the released lock.
        code: LockCode,
        /// Row identifier of the released lock.
        row_id: LockRowId,
    },
    /// A lock was forcibly released by an administrative override.
    Cracked {
        /// Code of the cracked lock.
        code: LockCode,
        /// Row identifier of the cracked lock.
        row_id: LockRowId,
    },
    /// A lock owned by a dead process was released.
    DeadOwnerReleased {
        /// Code of the released lock.
        code: LockCode,
        /// Row identifier of the released lock.
        row_id: LockRowId,
        /// Owner that was found dead.
        owner: LockOwner,
        /// Moment the dead owner had acquired the lock, if recorded.
        locked_at: Option<Timestamp>,
    },
    /// A lock owned by a host absent from the cluster was released.
    DanglingReleased {
        /// Code of the released lock.
        code: LockCode,
        /// Row identifier of the released lock.
        row_id: LockRowId,
        /// Host that no longer exists in the cluster.
        owner_host: HostId,
        /// Hosts considered valid at sweep time, for audit.
        valid_hosts: BTreeSet<HostId>,
    },
    /// Unused free rows were deleted.
    UnusedSwept {
        /// Number of rows deleted.
        deleted: u64,
        /// Staleness cutoff used for the sweep.
        cutoff: Timestamp,
    },
    /// A sweep could not process one row and moved on.
    SweepRowFailed {
        /// Code of the row that failed, when known.
        code: LockCode,
        /// Row identifier of the row that failed.
        row_id: LockRowId,
        /// Failure description.
        message: String,
    },
    /// A sweep failed before reaching any row.
    SweepFailed {
        /// Failure description.
        message: String,
    },
}

impl LockEvent {
    /// Returns the severity of the event.
    #[must_use]
    pub const fn severity(&self) -> EventSeverity {
        match self {
            Self::Acquired { .. } | Self::Released { .. } | Self::UnusedSwept { .. } => {
                EventSeverity::Info
            }
            Self::Cracked { .. }
            | Self::DeadOwnerReleased { .. }
            | Self::DanglingReleased { .. }
            | Self::SweepRowFailed { .. }
            | Self::SweepFailed { .. } => EventSeverity::Warning,
        }
    }
}

// ============================================================================
// SECTION: Sink Trait
// ============================================================================

/// Receives lock lifecycle events.
///
/// Emission is best-effort by contract: implementations absorb their own
/// delivery failures instead of propagating them into lock operations.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: &LockEvent);
}

// ============================================================================
// SECTION: Implementations
// ============================================================================

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &LockEvent) {}
}

/// Channel-based event sink.
///
/// # Invariants
/// - Each emitted event is sent at most once; a disconnected receiver drops
///   the event silently.
#[derive(Debug)]
pub struct ChannelSink {
    /// Sender guarded for shared use across threads.
    sender: Mutex<Sender<LockEvent>>,
}

impl ChannelSink {
    /// Creates a channel sink from a sender.
    #[must_use]
    pub fn new(sender: Sender<LockEvent>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &LockEvent) {
        if let Ok(guard) = self.sender.lock() {
            // A disconnected receiver drops the event.
            let _ = guard.send(event.clone());
        }
    }
}

/// Callback-based event sink.
#[derive(Clone)]
pub struct CallbackSink {
    /// Handler invoked with each event.
    handler: Arc<CallbackHandler>,
}

/// Callback handler signature used by the sink.
type CallbackHandler = dyn Fn(&LockEvent) + Send + Sync;

impl CallbackSink {
    /// Creates a callback sink from a handler function.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&LockEvent) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl EventSink for CallbackSink {
    fn emit(&self, event: &LockEvent) {
        (self.handler)(event);
    }
}

/// Log sink writing one JSON record per event.
pub struct LogSink<W: Write + Send> {
    /// Output writer for log records.
    writer: Mutex<W>,
}

impl<W: Write + Send> LogSink<W> {
    /// Creates a log sink over the provided writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> EventSink for LogSink<W> {
    fn emit(&self, event: &LockEvent) {
        let record = json!({
            "severity": event.severity().as_str(),
            "event": event,
        });
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        if serde_json::to_writer(&mut *guard, &record).is_err() {
            return;
        }
        // A torn trailing newline is left to the stream owner.
        let _ = guard.write_all(b"\n");
    }
}
