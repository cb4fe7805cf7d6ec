//! Migration steps and the step registry.
//!
//! A step is a forward-only transformation of one data type up to a target
//! version. The engine only looks at the descriptor metadata; the action is
//! opaque and supplied by whoever owns the data type.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ActionError, MigrationError, MigrationResult};
use crate::location::EntityId;
use crate::version::Version;

/// Tag naming one independently versioned slice of persisted state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataType(String);

impl DataType {
    /// Creates a data type tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for DataType {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// Whether a step runs once per installation or once per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepScope {
    /// Applied once, tracked in the global ledger.
    Global,
    /// Applied per entity, tracked in that entity's ledger.
    Entity,
}

/// What an action gets to see while it runs.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Data type being migrated.
    pub data_type: &'a DataType,
    /// Version the step migrates to.
    pub target_version: &'a Version,
    /// Entity being migrated, absent for global steps.
    pub entity_id: Option<&'a EntityId>,
    /// Storage root of the entity, absent for global steps.
    pub storage_path: Option<&'a Path>,
}

/// The transformation performed by a step.
pub trait MigrationAction: Send + Sync {
    /// Applies the transformation.
    ///
    /// # Errors
    /// Any error aborts the step; the ledger is not advanced.
    fn apply(&self, ctx: &StepContext<'_>) -> Result<(), ActionError>;
}

impl<F> MigrationAction for F
where
    F: Fn(&StepContext<'_>) -> Result<(), ActionError> + Send + Sync,
{
    fn apply(&self, ctx: &StepContext<'_>) -> Result<(), ActionError> {
        self(ctx)
    }
}

/// Pins a closure to the action signature so its argument types are inferred.
///
/// ```
/// use stepledger::step::{action, StepDescriptor};
///
/// let step = StepDescriptor::global("2.0", "users", action(|_ctx| Ok(()))).unwrap();
/// assert_eq!(step.data_type().as_str(), "users");
/// ```
pub fn action<F>(f: F) -> F
where
    F: Fn(&StepContext<'_>) -> Result<(), ActionError> + Send + Sync,
{
    f
}

/// Metadata plus action of one migration step.
#[derive(Clone)]
pub struct StepDescriptor {
    target_version: Version,
    data_type: DataType,
    scope: StepScope,
    description: String,
    action: Arc<dyn MigrationAction>,
}

impl StepDescriptor {
    /// Creates a descriptor.
    pub fn new(
        target_version: Version,
        data_type: impl Into<DataType>,
        scope: StepScope,
        action: impl MigrationAction + 'static,
    ) -> Self {
        Self {
            target_version,
            data_type: data_type.into(),
            scope,
            description: String::new(),
            action: Arc::new(action),
        }
    }

    /// Creates a global step, parsing the target version.
    ///
    /// # Errors
    /// Returns `MigrationError::Parse` for a malformed version.
    pub fn global(
        target_version: &str,
        data_type: impl Into<DataType>,
        action: impl MigrationAction + 'static,
    ) -> MigrationResult<Self> {
        Ok(Self::new(Version::parse(target_version)?, data_type, StepScope::Global, action))
    }

    /// Creates an entity-scoped step, parsing the target version.
    ///
    /// # Errors
    /// Returns `MigrationError::Parse` for a malformed version.
    pub fn entity(
        target_version: &str,
        data_type: impl Into<DataType>,
        action: impl MigrationAction + 'static,
    ) -> MigrationResult<Self> {
        Ok(Self::new(Version::parse(target_version)?, data_type, StepScope::Entity, action))
    }

    /// Attaches a human readable description used in logs.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Target version.
    #[must_use]
    pub const fn target_version(&self) -> &Version {
        &self.target_version
    }

    /// Affected data type.
    #[must_use]
    pub const fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Global or entity scope.
    #[must_use]
    pub const fn scope(&self) -> StepScope {
        self.scope
    }

    /// Description, possibly empty.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn action(&self) -> &dyn MigrationAction {
        self.action.as_ref()
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("target_version", &self.target_version)
            .field("data_type", &self.data_type)
            .field("scope", &self.scope)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Statically assembled set of steps, wired at startup.
///
/// Registration order is kept and used as the tie breaker for steps of
/// different data types that share a target version.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: Vec<StepDescriptor>,
}

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step.
    ///
    /// # Errors
    /// Returns `MigrationError::DuplicateStep` if a step with the same scope,
    /// data type and target version is already registered.
    pub fn register(&mut self, step: StepDescriptor) -> MigrationResult<()> {
        let duplicate = self.steps.iter().any(|s| {
            s.scope == step.scope
                && s.data_type == step.data_type
                && s.target_version == step.target_version
        });
        if duplicate {
            return Err(MigrationError::DuplicateStep {
                data_type: step.data_type,
                target_version: step.target_version,
            });
        }
        self.steps.push(step);
        Ok(())
    }

    /// Builder-style [`StepRegistry::register`].
    ///
    /// # Errors
    /// See [`StepRegistry::register`].
    pub fn with(mut self, step: StepDescriptor) -> MigrationResult<Self> {
        self.register(step)?;
        Ok(self)
    }

    /// Builds a registry from an unordered collection.
    ///
    /// # Errors
    /// See [`StepRegistry::register`].
    pub fn from_steps(steps: impl IntoIterator<Item = StepDescriptor>) -> MigrationResult<Self> {
        let mut registry = Self::new();
        for step in steps {
            registry.register(step)?;
        }
        Ok(registry)
    }

    /// Steps of the given scope, in registration order.
    pub fn steps(&self, scope: StepScope) -> impl Iterator<Item = &StepDescriptor> {
        self.steps.iter().filter(move |s| s.scope == scope)
    }

    /// Total number of registered steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if no steps are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
