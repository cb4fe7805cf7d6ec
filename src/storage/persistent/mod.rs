//! Persistent ledger backend.
//!
//! This module provides durable, crash-safe ledgers with:
//! - Atomic temp-file + fsync + rename replacement on every write
//! - File locking so only one process migrates a ledger at a time
//! - CRC32 checksums for corruption detection
//!
//! # Layout
//!
//! ```text
//! <global dir>/
//!   applied-versions.ledger        global VersionLedger
//!   migration-strategies.ledger    StrategyLedger
//! <entity storage path>/
//!   .migrations/
//!     applied-versions.ledger      entity VersionLedger
//! ```

mod atomic;
mod codec;
mod file_lock;
mod ledger;
mod strategy;

pub use atomic::{atomic_write, remove_stale_temp_files};
pub use file_lock::FileLock;
pub use ledger::{FileLedger, FileLedgerProvider};
pub use strategy::FileStrategyLedger;

use std::path::Path;

use crate::error::{ConfigError, MigrationError};
use crate::storage::LedgerScope;

/// Configuration for file-backed ledgers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// File name of version ledgers.
    pub file_name: String,
    /// File name of the strategy ledger.
    pub strategy_file_name: String,
    /// Directory below an entity's storage path that holds its ledger.
    pub entity_ledger_dir: String,
    /// Whether to fsync every write. On by default; turning it off keeps
    /// writes atomic but no longer durable when `set` returns, so a crash can
    /// roll the ledger back and steps will run again.
    pub sync_on_write: bool,
    /// Whether to hold an exclusive file lock while a ledger is open.
    pub lock: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            file_name: "applied-versions.ledger".to_string(),
            strategy_file_name: "migration-strategies.ledger".to_string(),
            entity_ledger_dir: ".migrations".to_string(),
            sync_on_write: true,
            lock: true,
        }
    }
}

impl LedgerConfig {
    fn check_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::Empty { field });
        }
        let plain = Path::new(value).file_name().and_then(|n| n.to_str()) == Some(value);
        if !plain || value == "." || value == ".." {
            return Err(ConfigError::NotAFileName {
                field,
                value: value.to_string(),
            });
        }
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` for empty names, names with path separators, or a
    /// strategy file name equal to the version ledger file name.
    pub fn validate(self) -> Result<Self, ConfigError> {
        Self::check_name("file_name", &self.file_name)?;
        Self::check_name("strategy_file_name", &self.strategy_file_name)?;
        Self::check_name("entity_ledger_dir", &self.entity_ledger_dir)?;
        if self.file_name == self.strategy_file_name {
            return Err(ConfigError::NotAFileName {
                field: "strategy_file_name",
                value: self.strategy_file_name,
            });
        }
        Ok(self)
    }
}

/// Open or create the global version ledger in `dir`.
///
/// # Errors
/// - If the configuration is invalid
/// - If another process holds the lock
/// - If the ledger file is corrupted
///
/// # Example
/// ```rust,ignore
/// use stepledger::storage::persistent::open_global_ledger;
///
/// let ledger = open_global_ledger("/var/lib/app/config", None)?;
/// ```
pub fn open_global_ledger(
    dir: impl AsRef<Path>,
    config: Option<LedgerConfig>,
) -> Result<FileLedger, MigrationError> {
    let cfg = config.unwrap_or_default().validate()?;
    Ok(FileLedger::open(dir.as_ref(), LedgerScope::Global, &cfg)?)
}

/// Open or create the strategy ledger in `dir`.
///
/// # Errors
/// Same conditions as [`open_global_ledger`].
pub fn open_strategy_ledger(
    dir: impl AsRef<Path>,
    config: Option<LedgerConfig>,
) -> Result<FileStrategyLedger, MigrationError> {
    let cfg = config.unwrap_or_default().validate()?;
    Ok(FileStrategyLedger::open(dir.as_ref(), &cfg)?)
}
