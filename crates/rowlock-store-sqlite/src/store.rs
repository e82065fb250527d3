// rowlock-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Lock Row Store
// Description: Durable LockRowStore backed by SQLite.
// Purpose: Persist lock rows and execute the atomic conditional owner update.
// Dependencies: rowlock-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`LockRowStore`] using `SQLite`. The
//! conditional owner update runs as one SQL `UPDATE` whose predicate matches
//! the expected owner with null-safe `IS` comparisons; the statement's
//! change count is the caller's success signal. Decoding fails closed when
//! a row carries exactly one of the two owner columns.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rowlock_core::HostId;
use rowlock_core::LockCode;
use rowlock_core::LockOwner;
use rowlock_core::LockRow;
use rowlock_core::LockRowId;
use rowlock_core::LockRowStore;
use rowlock_core::ProcessId;
use rowlock_core::StoreError;
use rowlock_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Column list shared by every row select.
const ROW_COLUMNS: &str = "id, code, owner_host, owner_process, locked_at, used_at";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` lock row store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with defaults for the provided path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite lock store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite lock store db error: {0}")]
    Db(String),
    /// Store corruption, including half-set owner columns.
    #[error("sqlite lock store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite lock store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite lock store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => {
                Self::Unavailable(message)
            }
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed lock row store.
///
/// # Invariants
/// - Connection access is serialized through a mutex; the conditional owner
///   update therefore executes as one atomic statement per caller.
/// - Owner columns are written and cleared together, never individually.
#[derive(Clone)]
pub struct SqliteLockStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteLockStore {
    /// Opens an `SQLite`-backed lock row store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection, mapping a poisoned mutex to a store failure.
    fn connection(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite connection mutex poisoned".to_string()))
    }

    /// Looks up a row by code.
    fn query_by_code(&self, code: &LockCode) -> Result<Option<LockRow>, SqliteStoreError> {
        let guard = self.connection()?;
        guard
            .query_row(
                &format!("SELECT {ROW_COLUMNS} FROM lock_rows WHERE code = ?1"),
                params![code.as_str()],
                decode_row,
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?
            .transpose()
    }

    /// Finds or creates the row for `code`, bumping `used_at` either way.
    fn upsert_by_code(&self, code: &LockCode, now: Timestamp) -> Result<LockRow, SqliteStoreError> {
        let mut guard = self.connection()?;
        let tx = guard.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "INSERT INTO lock_rows (code, used_at) VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET used_at = excluded.used_at",
            params![code.as_str(), now.as_unix_millis()],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let row = tx
            .query_row(
                &format!("SELECT {ROW_COLUMNS} FROM lock_rows WHERE code = ?1"),
                params![code.as_str()],
                decode_row,
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))??;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(row)
    }

    /// Runs the conditional owner update and returns the change count.
    fn update_owner_where(
        &self,
        id: LockRowId,
        expected: Option<&LockOwner>,
        new_owner: &LockOwner,
        now: Timestamp,
    ) -> Result<u64, SqliteStoreError> {
        let row_id = encode_row_id(id)?;
        let expected_host = expected.map(|owner| owner.host.as_str().to_string());
        let expected_process = expected.map(|owner| i64::from(owner.process.get()));
        let guard = self.connection()?;
        let changed = guard
            .execute(
                "UPDATE lock_rows
                 SET owner_host = ?1, owner_process = ?2, locked_at = ?3, used_at = ?3
                 WHERE id = ?4 AND owner_host IS ?5 AND owner_process IS ?6",
                params![
                    new_owner.host.as_str(),
                    i64::from(new_owner.process.get()),
                    now.as_unix_millis(),
                    row_id,
                    expected_host,
                    expected_process,
                ],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    /// Clears the owner columns and `locked_at` for a row id.
    fn clear_owner_by_id(&self, id: LockRowId) -> Result<(), SqliteStoreError> {
        let row_id = encode_row_id(id)?;
        let guard = self.connection()?;
        guard
            .execute(
                "UPDATE lock_rows
                 SET owner_host = NULL, owner_process = NULL, locked_at = NULL
                 WHERE id = ?1",
                params![row_id],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }

    /// Deletes free rows last used before the cutoff.
    fn delete_free_before(&self, cutoff: Timestamp) -> Result<u64, SqliteStoreError> {
        let guard = self.connection()?;
        let deleted = guard
            .execute(
                "DELETE FROM lock_rows
                 WHERE owner_host IS NULL AND owner_process IS NULL AND used_at < ?1",
                params![cutoff.as_unix_millis()],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
    }

    /// Collects the distinct owner hosts over held rows.
    fn query_owner_hosts(&self) -> Result<BTreeSet<HostId>, SqliteStoreError> {
        let guard = self.connection()?;
        let mut stmt = guard
            .prepare("SELECT DISTINCT owner_host FROM lock_rows WHERE owner_host IS NOT NULL")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let mut hosts = BTreeSet::new();
        for host in rows {
            hosts.insert(HostId::new(host.map_err(|err| SqliteStoreError::Db(err.to_string()))?));
        }
        Ok(hosts)
    }

    /// Collects rows owned by a host, optionally filtered by lock age.
    fn query_owned_by_host(
        &self,
        host: &HostId,
        locked_before: Option<Timestamp>,
    ) -> Result<Vec<LockRow>, SqliteStoreError> {
        let guard = self.connection()?;
        let sql = match locked_before {
            Some(_) => format!(
                "SELECT {ROW_COLUMNS} FROM lock_rows
                 WHERE owner_host = ?1 AND locked_at IS NOT NULL AND locked_at < ?2
                 ORDER BY id"
            ),
            None => format!("SELECT {ROW_COLUMNS} FROM lock_rows WHERE owner_host = ?1 ORDER BY id"),
        };
        let mut stmt =
            guard.prepare(&sql).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let decoded: Result<Vec<_>, _> = match locked_before {
            Some(cutoff) => stmt
                .query_map(params![host.as_str(), cutoff.as_unix_millis()], decode_row)
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?
                .collect(),
            None => stmt
                .query_map(params![host.as_str()], decode_row)
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?
                .collect(),
        };
        let decoded = decoded.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        decoded.into_iter().collect()
    }
}

impl LockRowStore for SqliteLockStore {
    fn find_by_code(&self, code: &LockCode) -> Result<Option<LockRow>, StoreError> {
        self.query_by_code(code).map_err(StoreError::from)
    }

    fn create_if_absent(&self, code: &LockCode, now: Timestamp) -> Result<LockRow, StoreError> {
        self.upsert_by_code(code, now).map_err(StoreError::from)
    }

    fn conditional_update_owner(
        &self,
        id: LockRowId,
        expected: Option<&LockOwner>,
        new_owner: &LockOwner,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        self.update_owner_where(id, expected, new_owner, now).map_err(StoreError::from)
    }

    fn clear_owner(&self, id: LockRowId) -> Result<(), StoreError> {
        self.clear_owner_by_id(id).map_err(StoreError::from)
    }

    fn delete_unused_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        self.delete_free_before(cutoff).map_err(StoreError::from)
    }

    fn distinct_owner_hosts(&self) -> Result<BTreeSet<HostId>, StoreError> {
        self.query_owner_hosts().map_err(StoreError::from)
    }

    fn owned_by_host(&self, host: &HostId) -> Result<Vec<LockRow>, StoreError> {
        self.query_owned_by_host(host, None).map_err(StoreError::from)
    }

    fn owned_by_host_locked_before(
        &self,
        host: &HostId,
        cutoff: Timestamp,
    ) -> Result<Vec<LockRow>, StoreError> {
        self.query_owned_by_host(host, Some(cutoff)).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Decodes one result row into a [`LockRow`], deferring integrity errors.
///
/// `rusqlite` row mappers can only fail with database errors, so integrity
/// violations (half-set owner, bad id) are carried as an inner result and
/// surfaced by the caller.
fn decode_row(row: &Row<'_>) -> Result<Result<LockRow, SqliteStoreError>, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let code: String = row.get(1)?;
    let owner_host: Option<String> = row.get(2)?;
    let owner_process: Option<i64> = row.get(3)?;
    let locked_at: Option<i64> = row.get(4)?;
    let used_at: i64 = row.get(5)?;
    Ok(build_row(id, code, owner_host, owner_process, locked_at, used_at))
}

/// Builds a [`LockRow`] from raw column values, failing closed on integrity
/// violations.
fn build_row(
    id: i64,
    code: String,
    owner_host: Option<String>,
    owner_process: Option<i64>,
    locked_at: Option<i64>,
    used_at: i64,
) -> Result<LockRow, SqliteStoreError> {
    let id = u64::try_from(id)
        .ok()
        .and_then(LockRowId::from_raw)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid row id {id} for '{code}'")))?;
    let owner = match (owner_host, owner_process) {
        (None, None) => None,
        (Some(host), Some(process)) => {
            let process = u32::try_from(process).map_err(|_| {
                SqliteStoreError::Corrupt(format!("invalid owner pid {process} for '{code}'"))
            })?;
            Some(LockOwner::new(HostId::new(host), ProcessId::new(process)))
        }
        (Some(_), None) => {
            return Err(SqliteStoreError::Corrupt(format!(
                "half-set owner for '{code}': host without pid"
            )));
        }
        (None, Some(_)) => {
            return Err(SqliteStoreError::Corrupt(format!(
                "half-set owner for '{code}': pid without host"
            )));
        }
    };
    if owner.is_some() != locked_at.is_some() {
        return Err(SqliteStoreError::Corrupt(format!(
            "locked_at disagrees with owner presence for '{code}'"
        )));
    }
    Ok(LockRow {
        id,
        code: LockCode::new(code),
        owner,
        locked_at: locked_at.map(Timestamp::from_unix_millis),
        used_at: Timestamp::from_unix_millis(used_at),
    })
}

/// Encodes a row id for SQL parameters.
fn encode_row_id(id: LockRowId) -> Result<i64, SqliteStoreError> {
    i64::try_from(id.get())
        .map_err(|_| SqliteStoreError::Invalid(format!("row id {id} exceeds sqlite range")))
}

// ============================================================================
// SECTION: Connection Setup
// ============================================================================

/// Validates the configured database path.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let rendered = path.to_string_lossy();
    if rendered.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid(format!(
            "store path exceeds max length: {} (max {MAX_TOTAL_PATH_LENGTH})",
            rendered.len()
        )));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(format!(
                "store path component exceeds max length (max {MAX_PATH_COMPONENT_LENGTH})"
            )));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(format!(
            "store path is a directory: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Creates the parent directory of the database file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS lock_rows (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    code TEXT NOT NULL UNIQUE,
                    owner_host TEXT,
                    owner_process INTEGER,
                    locked_at INTEGER,
                    used_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_lock_rows_owner_host
                    ON lock_rows (owner_host);
                CREATE INDEX IF NOT EXISTS idx_lock_rows_used_at
                    ON lock_rows (used_at);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
