//! Outcomes of migration runs.

use crate::error::MigrationError;
use crate::location::EntityId;
use crate::step::DataType;
use crate::storage::{AppliedVersion, LedgerScope};
use crate::version::Version;

/// A step that a run would execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    /// Data type of the step.
    pub data_type: DataType,
    /// Version the step migrates to.
    pub target_version: Version,
    /// Version recorded before the run, `None` for a new data type.
    pub current: Option<Version>,
    /// Step description.
    pub description: String,
}

/// Pending steps of one ledger, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Ledger the plan was computed against.
    pub scope: LedgerScope,
    /// Steps to execute, oldest target first.
    pub steps: Vec<PlannedStep>,
}

impl MigrationPlan {
    /// True if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of pending steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// Steps executed against one ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Ledger that was migrated.
    pub scope: LedgerScope,
    /// Ledger rows written, in execution order.
    pub executed: Vec<AppliedVersion>,
}

impl MigrationReport {
    pub(crate) fn new(scope: LedgerScope) -> Self {
        Self {
            scope,
            executed: Vec::new(),
        }
    }

    /// Number of executed steps.
    #[must_use]
    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    /// True if the run executed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.executed.is_empty()
    }

    /// Version recorded for `data_type` by this run, if any step of it ran.
    #[must_use]
    pub fn final_version(&self, data_type: &DataType) -> Option<&Version> {
        self.executed
            .iter()
            .rev()
            .find(|row| &row.data_type == data_type)
            .map(|row| &row.version)
    }
}

/// An entity whose migration failed and was left behind.
#[derive(Debug)]
pub struct EntityFailure {
    /// The entity.
    pub entity_id: EntityId,
    /// Why it failed.
    pub error: MigrationError,
    /// Steps recorded in the entity's ledger before the failure, in order.
    pub executed: Vec<AppliedVersion>,
}

impl EntityFailure {
    /// Last version recorded for `data_type` before the failure, if any.
    #[must_use]
    pub fn recorded_version(&self, data_type: &DataType) -> Option<&Version> {
        self.executed
            .iter()
            .rev()
            .find(|row| &row.data_type == data_type)
            .map(|row| &row.version)
    }
}

/// Outcome of migrating every entity.
#[derive(Debug, Default)]
pub struct EntityMigrationReport {
    /// Entities that are fully migrated, in enumeration order.
    pub migrated: Vec<MigrationReport>,
    /// Entities left partially migrated, in enumeration order.
    pub failed: Vec<EntityFailure>,
}

impl EntityMigrationReport {
    /// True if at least one entity failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Ids of failed entities.
    pub fn failed_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.failed.iter().map(|f| &f.entity_id)
    }

    /// Total steps executed across all migrated entities.
    #[must_use]
    pub fn executed_count(&self) -> usize {
        self.migrated.iter().map(MigrationReport::executed_count).sum()
    }
}

/// Outcome of a full startup migration.
#[derive(Debug)]
pub struct StartupReport {
    /// Global steps executed.
    pub global: MigrationReport,
    /// Per-entity outcomes.
    pub entities: EntityMigrationReport,
}

impl StartupReport {
    /// True if any entity was left behind.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.entities.has_failures()
    }
}
