//! Abstract ledger traits.
//!
//! These traits define the contract every ledger backend implements:
//! - In-memory backends for tests and embedded use
//! - File-backed backends with atomic replace for production

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::{EntityId, EntityLocation};
use crate::step::DataType;
use crate::strategy::{MigrationStrategy, StrategyChoice};
use crate::version::Version;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data failed validation.
    #[error("Ledger corrupted: {0}")]
    Corrupted(String),

    /// Attempt to move a recorded version backwards.
    #[error("Refusing to lower {data_type} from {current} to {attempted}")]
    VersionRegression {
        /// Data type whose record was targeted.
        data_type: DataType,
        /// Version currently recorded.
        current: Version,
        /// Rejected version.
        attempted: Version,
    },

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Another process holds the ledger lock.
    #[error("Ledger is locked: {0}")]
    Locked(String),

    /// A thread panicked while holding an in-process ledger lock.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

impl StorageError {
    pub(crate) const fn poisoned(context: &'static str) -> Self {
        Self::LockPoisoned(context)
    }
}

/// Which ledger a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "entity_id", rename_all = "snake_case")]
pub enum LedgerScope {
    /// The process-wide ledger.
    Global,
    /// The ledger stored with one entity.
    Entity(EntityId),
}

impl LedgerScope {
    /// The entity id, if this is an entity ledger.
    #[must_use]
    pub const fn entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::Global => None,
            Self::Entity(id) => Some(id),
        }
    }
}

impl fmt::Display for LedgerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Entity(id) => write!(f, "entity '{id}'"),
        }
    }
}

/// One row of a ledger: the last version fully applied for a data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedVersion {
    /// Data type.
    pub data_type: DataType,
    /// Entity, absent for global rows.
    pub entity_id: Option<EntityId>,
    /// Last applied version.
    pub version: Version,
    /// When the version was recorded.
    pub applied_at: DateTime<Utc>,
}

/// Durable record of the last version applied per data type.
///
/// One instance covers one [`LedgerScope`]. Versions recorded for a data type
/// never decrease.
pub trait VersionLedger: Send + Sync {
    /// The scope this ledger tracks.
    fn scope(&self) -> &LedgerScope;

    /// Last applied version for `data_type`, or `None` if nothing ran yet.
    fn get(&self, data_type: &DataType) -> Result<Option<Version>, StorageError>;

    /// Records `version` for `data_type`. Durable once this returns.
    ///
    /// Setting the currently recorded version again is a no-op. File ledgers
    /// opened with `sync_on_write: false` still replace the file atomically but
    /// skip the fsyncs, so a crash may lose writes that already returned.
    ///
    /// # Errors
    /// - `VersionRegression`: if `version` is older than the recorded one
    fn set(&self, data_type: &DataType, version: &Version) -> Result<(), StorageError>;

    /// All rows, sorted by data type.
    fn entries(&self) -> Result<Vec<AppliedVersion>, StorageError>;
}

/// Opens the ledgers the engine needs.
pub trait LedgerProvider: Send + Sync {
    /// Opens the ledger stored with the given entity.
    fn entity_ledger(&self, location: &EntityLocation)
        -> Result<Box<dyn VersionLedger>, StorageError>;
}

/// Persisted one-shot strategy decisions per entity.
pub trait StrategyLedger: Send + Sync {
    /// The stored choice for `entity_id`, if any.
    fn get(&self, entity_id: &EntityId) -> Result<Option<StrategyChoice>, StorageError>;

    /// Stores the choice for `entity_id` and returns it.
    ///
    /// # Errors
    /// - `DuplicateKey`: if a choice is already stored; it is never overwritten
    fn set(
        &self,
        entity_id: &EntityId,
        strategy: MigrationStrategy,
    ) -> Result<StrategyChoice, StorageError>;

    /// All stored choices, sorted by entity id.
    fn list(&self) -> Result<Vec<StrategyChoice>, StorageError>;
}

pub(crate) fn check_monotonic(
    data_type: &DataType,
    current: Option<&Version>,
    attempted: &Version,
) -> Result<bool, StorageError> {
    match current {
        Some(current) if attempted.is_older(current) => Err(StorageError::VersionRegression {
            data_type: data_type.clone(),
            current: current.clone(),
            attempted: attempted.clone(),
        }),
        Some(current) if current == attempted => Ok(false),
        _ => Ok(true),
    }
}
