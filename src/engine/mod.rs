//! The migration engine.
//!
//! Given a [`StepRegistry`] and a [`VersionLedger`], the engine computes which
//! steps are still owed, runs them oldest-first, and advances the ledger after
//! every successful step so that a restart resumes exactly where a previous
//! run stopped.
//!
//! # Failure policy
//!
//! - Global steps are fail-fast: the first failure aborts the run.
//! - Entity steps are isolated: a failing entity is reported and left at its
//!   last recorded version while the remaining entities are still migrated.

mod report;
mod runtime;

pub use report::{
    EntityFailure, EntityMigrationReport, MigrationPlan, MigrationReport, PlannedStep,
    StartupReport,
};

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, MigrationError, MigrationResult, StepExecutionError};
use crate::location::{EntityLocation, LocationResolver};
use crate::step::{DataType, StepContext, StepDescriptor, StepRegistry, StepScope};
use crate::storage::{AppliedVersion, LedgerProvider, StorageError, VersionLedger};
use crate::version::Version;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of entities migrated concurrently. `1` migrates strictly in
    /// enumeration order on the calling thread.
    pub entity_workers: usize,
    /// Maximum queued entities per worker pool.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entity_workers: 1,
            queue_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::TooSmall` if any value is zero.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.entity_workers == 0 {
            return Err(ConfigError::TooSmall {
                field: "entity_workers",
                min: 1,
                actual: 0,
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::TooSmall {
                field: "queue_capacity",
                min: 1,
                actual: 0,
            });
        }
        Ok(self)
    }
}

struct Pending<'a> {
    step: &'a StepDescriptor,
    current: Option<Version>,
}

/// Selects the steps of `scope` still owed to `ledger`, in execution order.
///
/// Per data type a step is owed when its target is semantically newer than
/// the recorded version (a missing record is older than everything). Owed
/// steps are ordered by target version, then registration order.
fn pending_steps<'a>(
    registry: &'a StepRegistry,
    scope: StepScope,
    ledger: &dyn VersionLedger,
) -> Result<Vec<Pending<'a>>, StorageError> {
    let mut recorded: HashMap<&DataType, Option<Version>> = HashMap::new();
    let mut pending = Vec::new();

    for (order, step) in registry.steps(scope).enumerate() {
        let current = match recorded.get(step.data_type()) {
            Some(current) => current.clone(),
            None => {
                let current = ledger.get(step.data_type())?;
                recorded.insert(step.data_type(), current.clone());
                current
            }
        };
        let owed = current
            .as_ref()
            .map_or(true, |current| step.target_version().is_newer(current));
        if owed {
            pending.push((order, Pending { step, current }));
        }
    }

    pending.sort_by(|(a_order, a), (b_order, b)| {
        a.step
            .target_version()
            .semantic_cmp(b.step.target_version())
            .then_with(|| a_order.cmp(b_order))
    });
    Ok(pending.into_iter().map(|(_, p)| p).collect())
}

/// Orchestrates global and entity-scoped migrations.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    registry: StepRegistry,
    config: EngineConfig,
}

impl MigrationEngine {
    /// Creates an engine with the default (sequential) configuration.
    #[must_use]
    pub fn new(registry: StepRegistry) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
        }
    }

    /// Creates an engine with a custom configuration.
    ///
    /// # Errors
    /// Returns `MigrationError::Config` if the configuration is invalid.
    pub fn with_config(registry: StepRegistry, config: EngineConfig) -> MigrationResult<Self> {
        Ok(Self {
            registry,
            config: config.validate()?,
        })
    }

    /// The registered steps.
    #[must_use]
    pub const fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn plan(&self, scope: StepScope, ledger: &dyn VersionLedger) -> Result<MigrationPlan, StorageError> {
        let steps = pending_steps(&self.registry, scope, ledger)?
            .into_iter()
            .map(|p| PlannedStep {
                data_type: p.step.data_type().clone(),
                target_version: p.step.target_version().clone(),
                current: p.current,
                description: p.step.description().to_string(),
            })
            .collect();
        Ok(MigrationPlan {
            scope: ledger.scope().clone(),
            steps,
        })
    }

    /// Global steps still owed to `ledger`, without executing anything.
    ///
    /// # Errors
    /// Propagates ledger read failures.
    pub fn plan_global(&self, ledger: &dyn VersionLedger) -> Result<MigrationPlan, StorageError> {
        self.plan(StepScope::Global, ledger)
    }

    /// Entity steps still owed to one entity's `ledger`, without executing anything.
    ///
    /// # Errors
    /// Propagates ledger read failures.
    pub fn plan_entity(&self, ledger: &dyn VersionLedger) -> Result<MigrationPlan, StorageError> {
        self.plan(StepScope::Entity, ledger)
    }

    /// Runs owed steps, appending each recorded one to `report`.
    ///
    /// On failure `report` keeps the steps recorded before it.
    fn execute(
        &self,
        scope: StepScope,
        ledger: &dyn VersionLedger,
        location: Option<&EntityLocation>,
        report: &mut MigrationReport,
    ) -> MigrationResult<()> {
        let pending = pending_steps(&self.registry, scope, ledger)?;
        if pending.is_empty() {
            debug!(scope = %ledger.scope(), "ledger is up to date");
            return Ok(());
        }

        for Pending { step, current } in pending {
            let ctx = StepContext {
                data_type: step.data_type(),
                target_version: step.target_version(),
                entity_id: location.map(|l| &l.entity_id),
                storage_path: location.map(|l| l.storage_path.as_path()),
            };

            let started = Instant::now();
            step.action()
                .apply(&ctx)
                .map_err(|source| StepExecutionError {
                    data_type: step.data_type().clone(),
                    target_version: step.target_version().clone(),
                    entity_id: location.map(|l| l.entity_id.clone()),
                    source,
                })?;
            ledger.set(step.data_type(), step.target_version())?;

            info!(
                scope = %ledger.scope(),
                data_type = %step.data_type(),
                from = %current.as_ref().map_or_else(|| "none".to_string(), ToString::to_string),
                to = %step.target_version(),
                elapsed = ?started.elapsed(),
                description = step.description(),
                "applied migration step"
            );
            report.executed.push(AppliedVersion {
                data_type: step.data_type().clone(),
                entity_id: location.map(|l| l.entity_id.clone()),
                version: step.target_version().clone(),
                applied_at: Utc::now(),
            });
        }
        Ok(())
    }

    fn run_scope(
        &self,
        scope: StepScope,
        ledger: &dyn VersionLedger,
        location: Option<&EntityLocation>,
    ) -> MigrationResult<MigrationReport> {
        let mut report = MigrationReport::new(ledger.scope().clone());
        self.execute(scope, ledger, location, &mut report)?;
        Ok(report)
    }

    /// Runs every owed global step against `ledger`.
    ///
    /// # Errors
    /// The first failing step aborts the run with `MigrationError::Step`; all
    /// steps before it stay recorded. Ledger failures abort with
    /// `MigrationError::Storage`.
    pub fn run_global(&self, ledger: &dyn VersionLedger) -> MigrationResult<MigrationReport> {
        match self.run_scope(StepScope::Global, ledger, None) {
            Ok(report) => {
                info!(executed = report.executed_count(), "global migration finished");
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "global migration failed; aborting");
                Err(e)
            }
        }
    }

    /// Runs every owed entity step for one entity against its `ledger`.
    ///
    /// # Errors
    /// Same as [`MigrationEngine::run_global`], scoped to this entity.
    pub fn migrate_entity(
        &self,
        location: &EntityLocation,
        ledger: &dyn VersionLedger,
    ) -> MigrationResult<MigrationReport> {
        self.run_scope(StepScope::Entity, ledger, Some(location))
    }

    fn migrate_location(
        &self,
        location: &EntityLocation,
        provider: &dyn LedgerProvider,
    ) -> Result<MigrationReport, EntityFailure> {
        let failed = |error: MigrationError, executed: Vec<AppliedVersion>| EntityFailure {
            entity_id: location.entity_id.clone(),
            error,
            executed,
        };

        let ledger = provider
            .entity_ledger(location)
            .map_err(|e| failed(e.into(), Vec::new()))?;
        let mut report = MigrationReport::new(ledger.scope().clone());
        match self.execute(StepScope::Entity, ledger.as_ref(), Some(location), &mut report) {
            Ok(()) => Ok(report),
            Err(error) => Err(failed(error, report.executed)),
        }
    }

    /// Migrates every entity known to `resolver`.
    ///
    /// Failures are isolated per entity: they are logged and collected in the
    /// report, and never stop the remaining entities.
    ///
    /// # Errors
    /// Only if the entities cannot be enumerated or no worker can be started.
    pub fn run_entities(
        &self,
        resolver: &dyn LocationResolver,
        provider: &dyn LedgerProvider,
    ) -> MigrationResult<EntityMigrationReport> {
        let locations = resolver.collect_locations()?;
        let mut report = EntityMigrationReport::default();
        if self.registry.steps(StepScope::Entity).next().is_none() {
            debug!(entities = locations.len(), "no entity steps registered");
            return Ok(report);
        }

        let outcomes = if self.config.entity_workers > 1 {
            runtime::run_pool(
                locations,
                self.config.entity_workers,
                self.config.queue_capacity,
                |location| self.migrate_location(location, provider),
            )
            .map_err(StorageError::from)?
        } else {
            locations
                .into_iter()
                .map(|location| {
                    let result = self.migrate_location(&location, provider);
                    (location, result)
                })
                .collect()
        };

        for (location, result) in outcomes {
            match result {
                Ok(migrated) => report.migrated.push(migrated),
                Err(failure) => {
                    warn!(
                        entity = %location.entity_id,
                        storage_path = %location.storage_path.display(),
                        error = %failure.error,
                        recorded_before_failure = failure.executed.len(),
                        "entity migration failed; entity stays at its last applied version"
                    );
                    report.failed.push(failure);
                }
            }
        }

        info!(
            migrated = report.migrated.len(),
            failed = report.failed.len(),
            steps = report.executed_count(),
            "entity migration finished"
        );
        Ok(report)
    }

    /// Full startup sequence: global steps first, then every entity.
    ///
    /// # Errors
    /// A global failure aborts before any entity is touched. Entity failures
    /// are reported in [`StartupReport::entities`], not returned.
    pub fn run_startup(
        &self,
        global: &dyn VersionLedger,
        resolver: &dyn LocationResolver,
        provider: &dyn LedgerProvider,
    ) -> MigrationResult<StartupReport> {
        let global = self.run_global(global)?;
        let entities = self.run_entities(resolver, provider)?;
        Ok(StartupReport { global, entities })
    }
}
