// rowlock-core/src/runtime/store.rs
// ============================================================================
// Module: Rowlock In-Memory Store
// Description: Simple in-memory lock row store for tests and examples.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! This module provides a simple in-memory implementation of
//! [`LockRowStore`] for tests and local demos. A single mutex serializes
//! every operation, which trivially satisfies the atomicity contract of the
//! conditional owner update. It is not intended for production use; sharing
//! clones of one instance models several "processes" against one table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::HostId;
use crate::core::LockCode;
use crate::core::LockOwner;
use crate::core::LockRow;
use crate::core::LockRowId;
use crate::core::Timestamp;
use crate::interfaces::LockRowStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Mutable table state behind the store mutex.
#[derive(Debug, Default)]
struct TableState {
    /// Rows keyed by lock code.
    rows: BTreeMap<LockCode, LockRow>,
    /// Next surrogate key to assign (1-based).
    next_id: u64,
}

/// In-memory lock row store for tests and examples.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    /// Table state protected by a mutex.
    table: Arc<Mutex<TableState>>,
}

impl InMemoryLockStore {
    /// Creates a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the table, mapping a poisoned mutex to a store failure.
    fn table(&self) -> Result<MutexGuard<'_, TableState>, StoreError> {
        self.table
            .lock()
            .map_err(|_| StoreError::Unavailable("lock table mutex poisoned".to_string()))
    }
}

impl LockRowStore for InMemoryLockStore {
    fn find_by_code(&self, code: &LockCode) -> Result<Option<LockRow>, StoreError> {
        let guard = self.table()?;
        Ok(guard.rows.get(code).cloned())
    }

    fn create_if_absent(&self, code: &LockCode, now: Timestamp) -> Result<LockRow, StoreError> {
        let mut guard = self.table()?;
        if let Some(row) = guard.rows.get_mut(code) {
            row.used_at = now;
            return Ok(row.clone());
        }
        guard.next_id += 1;
        let id = LockRowId::from_raw(guard.next_id)
            .ok_or_else(|| StoreError::Invalid("row id overflowed to zero".to_string()))?;
        let row = LockRow {
            id,
            code: code.clone(),
            owner: None,
            locked_at: None,
            used_at: now,
        };
        guard.rows.insert(code.clone(), row.clone());
        Ok(row)
    }

    fn conditional_update_owner(
        &self,
        id: LockRowId,
        expected: Option<&LockOwner>,
        new_owner: &LockOwner,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        let mut guard = self.table()?;
        let Some(row) = guard.rows.values_mut().find(|row| row.id == id) else {
            return Ok(0);
        };
        if row.owner.as_ref() != expected {
            return Ok(0);
        }
        row.owner = Some(new_owner.clone());
        row.locked_at = Some(now);
        row.used_at = now;
        Ok(1)
    }

    fn clear_owner(&self, id: LockRowId) -> Result<(), StoreError> {
        let mut guard = self.table()?;
        if let Some(row) = guard.rows.values_mut().find(|row| row.id == id) {
            row.owner = None;
            row.locked_at = None;
        }
        Ok(())
    }

    fn delete_unused_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut guard = self.table()?;
        let before = guard.rows.len();
        guard.rows.retain(|_, row| !(row.is_free() && row.used_at.is_before(cutoff)));
        Ok(u64::try_from(before - guard.rows.len()).unwrap_or(u64::MAX))
    }

    fn distinct_owner_hosts(&self) -> Result<BTreeSet<HostId>, StoreError> {
        let guard = self.table()?;
        Ok(guard
            .rows
            .values()
            .filter_map(|row| row.owner.as_ref().map(|owner| owner.host.clone()))
            .collect())
    }

    fn owned_by_host(&self, host: &HostId) -> Result<Vec<LockRow>, StoreError> {
        let guard = self.table()?;
        Ok(guard
            .rows
            .values()
            .filter(|row| row.owner.as_ref().is_some_and(|owner| &owner.host == host))
            .cloned()
            .collect())
    }

    fn owned_by_host_locked_before(
        &self,
        host: &HostId,
        cutoff: Timestamp,
    ) -> Result<Vec<LockRow>, StoreError> {
        let guard = self.table()?;
        Ok(guard
            .rows
            .values()
            .filter(|row| {
                row.owner.as_ref().is_some_and(|owner| &owner.host == host)
                    && row.locked_at.is_some_and(|locked_at| locked_at.is_before(cutoff))
            })
            .cloned()
            .collect())
    }
}
