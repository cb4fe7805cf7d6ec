//! Error types for stepledger.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the exact failure (a malformed version, a failing step, a storage fault).

use thiserror::Error;

use crate::location::EntityId;
use crate::step::DataType;
use crate::storage::StorageError;
use crate::version::Version;

/// Boxed error raised by a migration action.
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A version string did not match the release grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid version '{input}': expected MAJOR[.MINOR[.PATCH]][-(SNAPSHOT|(M|alpha|beta|RC)N)]")]
pub struct VersionParseError {
    /// The rejected input.
    pub input: String,
}

impl VersionParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// A step action failed.
#[derive(Debug, Error)]
#[error("Step {data_type}@{target_version}{} failed: {source}", entity_suffix(.entity_id.as_ref()))]
pub struct StepExecutionError {
    /// Data type the step belongs to.
    pub data_type: DataType,
    /// Target version of the failing step.
    pub target_version: Version,
    /// Entity being migrated, absent for global steps.
    pub entity_id: Option<EntityId>,
    /// The failure raised by the action.
    #[source]
    pub source: ActionError,
}

fn entity_suffix(entity_id: Option<&EntityId>) -> String {
    entity_id.map_or_else(String::new, |id| format!(" for entity '{id}'"))
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("'{field}' must not be empty")]
    Empty {
        field: &'static str,
    },

    #[error("'{field}' must be a plain file name (got '{value}')")]
    NotAFileName {
        field: &'static str,
        value: String,
    },

    #[error("'{field}' must be at least {min} (got {actual})")]
    TooSmall {
        field: &'static str,
        min: usize,
        actual: usize,
    },
}

/// Top-level error type for stepledger.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Version error: {0}")]
    Parse(#[from] VersionParseError),

    #[error("Migration step failed: {0}")]
    Step(#[from] StepExecutionError),

    #[error("Ledger error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Duplicate step registered for {data_type}@{target_version}")]
    DuplicateStep {
        data_type: DataType,
        target_version: Version,
    },
}

impl MigrationError {
    /// Returns true if a step action failed.
    #[must_use]
    pub const fn is_step_failure(&self) -> bool {
        matches!(self, Self::Step(_))
    }

    /// Returns true if the ledger could not be read or written.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns the failing step error, if any.
    #[must_use]
    pub const fn as_step_failure(&self) -> Option<&StepExecutionError> {
        match self {
            Self::Step(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for stepledger operations.
pub type MigrationResult<T> = Result<T, MigrationError>;
