//! One-shot, persisted migration strategy decisions.
//!
//! Some migrations need a single, non-incremental decision per entity (for
//! example how an entity's storage layout gets moved). The decision is taken
//! once and remembered so later startups never ask again.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::location::EntityId;
use crate::storage::{StorageError, StrategyLedger};

/// How an entity's stored data is carried over to a new layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// Copy data to the new location, keeping the original.
    Copy,
    /// Move data to the new location.
    Move,
    /// Convert data in place.
    Inline,
}

impl MigrationStrategy {
    /// Stable tag used in persisted records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Inline => "inline",
        }
    }
}

impl fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationStrategy {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "move" => Ok(Self::Move),
            "inline" => Ok(Self::Inline),
            other => Err(StorageError::Serialization(format!(
                "unknown migration strategy '{other}'"
            ))),
        }
    }
}

/// A stored decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyChoice {
    /// The entity the decision applies to.
    pub entity_id: EntityId,
    /// The chosen strategy.
    pub strategy: MigrationStrategy,
    /// When the decision was recorded.
    pub decided_at: DateTime<Utc>,
}

impl StrategyChoice {
    /// Creates a choice stamped with the current time.
    #[must_use]
    pub fn now(entity_id: EntityId, strategy: MigrationStrategy) -> Self {
        Self {
            entity_id,
            strategy,
            decided_at: Utc::now(),
        }
    }
}

/// Returns the stored choice for `entity_id`, or runs `decide`, stores its
/// answer and returns it.
///
/// `decide` is only called when no choice exists yet.
///
/// # Errors
/// Propagates ledger failures; nothing is stored if `decide` fails.
pub fn decide_once<F, E>(
    ledger: &dyn StrategyLedger,
    entity_id: &EntityId,
    decide: F,
) -> Result<StrategyChoice, E>
where
    F: FnOnce() -> Result<MigrationStrategy, E>,
    E: From<StorageError>,
{
    if let Some(existing) = ledger.get(entity_id)? {
        return Ok(existing);
    }
    let strategy = decide()?;
    let choice = ledger.set(entity_id, strategy)?;
    info!(entity = %entity_id, strategy = %strategy, "recorded migration strategy");
    Ok(choice)
}
