//! File-backed strategy ledger.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::location::EntityId;
use crate::storage::traits::{StorageError, StrategyLedger};
use crate::strategy::{MigrationStrategy, StrategyChoice};

use super::atomic::{atomic_write, remove_stale_temp_files};
use super::codec;
use super::file_lock::FileLock;
use super::ledger::{acquire_lock, read_document};
use super::LedgerConfig;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StrategyDocument {
    choices: BTreeMap<EntityId, StrategyChoice>,
}

/// [`StrategyLedger`] stored in a single file.
#[derive(Debug)]
pub struct FileStrategyLedger {
    path: PathBuf,
    sync_on_write: bool,
    choices: RwLock<BTreeMap<EntityId, StrategyChoice>>,
    _lock: Option<FileLock>,
}

impl FileStrategyLedger {
    /// Opens the strategy ledger at `dir/config.strategy_file_name`.
    ///
    /// `config` must already be validated.
    ///
    /// # Errors
    /// - `Locked`: another process holds the ledger
    /// - `Corrupted`: the file exists but fails validation
    pub(crate) fn open(dir: &Path, config: &LedgerConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let lock = acquire_lock(dir, &config.strategy_file_name, config)?;

        let path = dir.join(&config.strategy_file_name);
        remove_stale_temp_files(&path)?;

        let choices = read_document::<StrategyDocument>(&path)?
            .unwrap_or_default()
            .choices;

        Ok(Self {
            path,
            sync_on_write: config.sync_on_write,
            choices: RwLock::new(choices),
            _lock: lock,
        })
    }

    /// Path of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StrategyLedger for FileStrategyLedger {
    fn get(&self, entity_id: &EntityId) -> Result<Option<StrategyChoice>, StorageError> {
        let choices = self
            .choices
            .read()
            .map_err(|_| StorageError::poisoned("strategy ledger"))?;
        Ok(choices.get(entity_id).cloned())
    }

    fn set(
        &self,
        entity_id: &EntityId,
        strategy: MigrationStrategy,
    ) -> Result<StrategyChoice, StorageError> {
        let mut choices = self
            .choices
            .write()
            .map_err(|_| StorageError::poisoned("strategy ledger"))?;
        if choices.contains_key(entity_id) {
            return Err(StorageError::DuplicateKey(entity_id.to_string()));
        }

        let choice = StrategyChoice::now(entity_id.clone(), strategy);
        let mut doc = StrategyDocument {
            choices: choices.clone(),
        };
        doc.choices.insert(entity_id.clone(), choice.clone());
        let bytes = codec::encode_document(&doc)?;
        atomic_write(&self.path, &bytes, self.sync_on_write)?;

        *choices = doc.choices;
        Ok(choice)
    }

    fn list(&self) -> Result<Vec<StrategyChoice>, StorageError> {
        let choices = self
            .choices
            .read()
            .map_err(|_| StorageError::poisoned("strategy ledger"))?;
        Ok(choices.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_choice_survives_reopen() {
        let dir = tempdir().unwrap();
        let config = LedgerConfig::default();
        let id = EntityId::new("repo-7");

        let stored = {
            let ledger = FileStrategyLedger::open(dir.path(), &config).unwrap();
            ledger.set(&id, MigrationStrategy::Copy).unwrap()
        };

        let ledger = FileStrategyLedger::open(dir.path(), &config).unwrap();
        assert_eq!(ledger.get(&id).unwrap(), Some(stored));
        assert!(matches!(
            ledger.set(&id, MigrationStrategy::Move),
            Err(StorageError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_coexists_with_global_ledger_in_same_dir() {
        use crate::storage::persistent::FileLedger;
        use crate::storage::LedgerScope;

        let dir = tempdir().unwrap();
        let config = LedgerConfig::default();
        let _versions = FileLedger::open(dir.path(), LedgerScope::Global, &config).unwrap();
        let strategies = FileStrategyLedger::open(dir.path(), &config).unwrap();
        assert!(strategies.list().unwrap().is_empty());
    }
}
