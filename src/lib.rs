//! # stepledger - Versioned, resumable data migrations
//!
//! stepledger brings persisted application state (global configuration,
//! users, per-repository metadata, ...) forward to the current format when a
//! new release starts up. Each independently versioned slice of state is a
//! *data type*; each transformation is a *step* targeting a release version.
//!
//! ## Core Concepts
//!
//! - **Version**: a parsed release identifier with a semantic ordering
//! - **Step**: forward-only transformation of one data type to a target version
//! - **Ledger**: durable record of the last version applied per data type
//! - **Engine**: runs owed steps oldest-first, exactly once, resumably
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stepledger::step::action;
//! use stepledger::storage::persistent::{open_global_ledger, FileLedgerProvider};
//! use stepledger::{DirectoryLocationResolver, MigrationEngine, StepDescriptor, StepRegistry};
//!
//! let registry = StepRegistry::new()
//!     .with(StepDescriptor::global("2.0.0", "users", action(|_ctx| Ok(())))?)?
//!     .with(StepDescriptor::entity("2.1.0", "repository-config", action(|ctx| {
//!         rewrite_config(ctx.storage_path.ok_or("no path")?)
//!     }))?)?;
//!
//! let engine = MigrationEngine::new(registry);
//! let report = engine.run_startup(
//!     &open_global_ledger("/var/lib/app/config", None)?,
//!     &DirectoryLocationResolver::new("/var/lib/app/repositories"),
//!     &FileLedgerProvider::default(),
//! )?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod error;
pub mod location;
pub mod step;
pub mod storage;
pub mod strategy;
pub mod version;

// Re-export primary types at crate root for convenience
pub use engine::{
    EngineConfig, EntityFailure, EntityMigrationReport, MigrationEngine, MigrationPlan,
    MigrationReport, PlannedStep, StartupReport,
};
pub use error::{
    ActionError, ConfigError, MigrationError, MigrationResult, StepExecutionError,
    VersionParseError,
};
pub use location::{
    DirectoryLocationResolver, EntityId, EntityLocation, LocationResolver, StaticLocationResolver,
};
pub use step::{DataType, MigrationAction, StepContext, StepDescriptor, StepRegistry, StepScope};
pub use storage::{
    AppliedVersion, LedgerProvider, LedgerScope, StorageError, StrategyLedger, VersionLedger,
};
pub use strategy::{decide_once, MigrationStrategy, StrategyChoice};
pub use version::{Maturity, NewestFirst, Version};
