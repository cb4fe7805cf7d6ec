//! Entity identity and storage locations.
//!
//! Entity-scoped migrations need to know which entities exist and where each
//! one keeps its data. That knowledge belongs to the host application and is
//! reached through the [`LocationResolver`] trait.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Stable identifier of one independently stored entity (e.g. a repository).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where an entity keeps its data. Immutable for one migration run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    /// The entity.
    pub entity_id: EntityId,
    /// Root directory of the entity's stored data.
    pub storage_path: PathBuf,
}

impl EntityLocation {
    /// Creates a new location.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            entity_id: entity_id.into(),
            storage_path: storage_path.into(),
        }
    }
}

/// Enumerates every known entity and its storage location.
///
/// Implementations must visit each entity exactly once per call.
pub trait LocationResolver: Send + Sync {
    /// Calls `consumer` once for every `(entity_id, storage_path)` pair.
    ///
    /// # Errors
    /// Returns a `StorageError` if the set of entities cannot be enumerated.
    fn for_all_locations(
        &self,
        consumer: &mut dyn FnMut(&EntityId, &Path),
    ) -> Result<(), StorageError>;

    /// Collects all locations into a vector.
    ///
    /// # Errors
    /// Propagates enumeration failures.
    fn collect_locations(&self) -> Result<Vec<EntityLocation>, StorageError> {
        let mut out = Vec::new();
        self.for_all_locations(&mut |id, path| {
            out.push(EntityLocation::new(id.clone(), path));
        })?;
        Ok(out)
    }
}

/// Resolver over an explicit list of locations.
#[derive(Debug, Clone, Default)]
pub struct StaticLocationResolver {
    locations: Vec<EntityLocation>,
}

impl StaticLocationResolver {
    /// Creates a resolver from a list of locations.
    #[must_use]
    pub fn new(locations: Vec<EntityLocation>) -> Self {
        Self { locations }
    }

    /// Adds a location.
    #[must_use]
    pub fn with(mut self, entity_id: impl Into<EntityId>, storage_path: impl Into<PathBuf>) -> Self {
        self.locations.push(EntityLocation::new(entity_id, storage_path));
        self
    }
}

impl LocationResolver for StaticLocationResolver {
    fn for_all_locations(
        &self,
        consumer: &mut dyn FnMut(&EntityId, &Path),
    ) -> Result<(), StorageError> {
        for location in &self.locations {
            consumer(&location.entity_id, &location.storage_path);
        }
        Ok(())
    }
}

/// Resolver treating every subdirectory of `root` as one entity.
///
/// The directory name is the entity id. Hidden directories (leading `.`) are
/// skipped. Entities are visited in lexical order.
#[derive(Debug, Clone)]
pub struct DirectoryLocationResolver {
    root: PathBuf,
}

impl DirectoryLocationResolver {
    /// Creates a resolver rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The scanned directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl LocationResolver for DirectoryLocationResolver {
    fn for_all_locations(
        &self,
        consumer: &mut dyn FnMut(&EntityId, &Path),
    ) -> Result<(), StorageError> {
        if !self.root.exists() {
            return Ok(());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            found.push((EntityId::new(name), entry.path()));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));

        for (id, path) in &found {
            consumer(id, path);
        }
        Ok(())
    }
}
