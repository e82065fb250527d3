// rowlock-config/src/lib.rs
// ============================================================================
// Module: Rowlock Config Library
// Description: Canonical TOML configuration model for Rowlock deployments.
// Purpose: Load and validate lock runtime and store settings fail-closed.
// Dependencies: rowlock-core, rowlock-store-sqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Embedding applications configure Rowlock from one TOML document holding
//! the lock runtime timings and the `SQLite` store settings. Loading is
//! strict and fail-closed: unknown keys, oversized files, non-UTF-8 input,
//! and out-of-range timings are all rejected with explicit errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use rowlock_core::LockSettings;
use rowlock_core::SettingsError;
use rowlock_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config file name looked up when no path is given.
const DEFAULT_CONFIG_PATH: &str = "rowlock.toml";
/// Maximum accepted config file size in bytes.
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;
/// Maximum accepted config path length.
const MAX_CONFIG_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config contents failed validation.
    #[error("config invalid: {0}")]
    Invalid(String),
}

impl From<SettingsError> for ConfigError {
    fn from(error: SettingsError) -> Self {
        Self::Invalid(error.to_string())
    }
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Canonical Rowlock configuration document.
///
/// # Invariants
/// - `lock` timings are strictly positive after validation.
/// - `store.path` is non-empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowlockConfig {
    /// Lock runtime timings.
    #[serde(default)]
    pub lock: LockSettings,
    /// `SQLite` store settings.
    pub store: SqliteStoreConfig,
}

impl RowlockConfig {
    /// Loads and validates a config file.
    ///
    /// When `path` is `None`, `rowlock.toml` in the working directory is
    /// used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, exceeds the
    /// size limit, is not valid UTF-8 TOML, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        if path.to_string_lossy().len() > MAX_CONFIG_PATH_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "config path exceeds max length ({MAX_CONFIG_PATH_LENGTH})"
            )));
        }
        let metadata =
            std::fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_BYTES {
            return Err(ConfigError::Invalid(format!(
                "config file exceeds max size: {} bytes (max {MAX_CONFIG_BYTES})",
                metadata.len()
            )));
        }
        let bytes = std::fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file is not valid UTF-8".to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates a config document from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a section is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lock.validate()?;
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store.path must not be empty".to_string()));
        }
        Ok(())
    }
}
