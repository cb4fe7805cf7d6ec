//! File-backed version ledgers.
//!
//! Each ledger is one file holding every row of its scope. Rows are cached in
//! memory, and the cache is only updated after the replacement file has been
//! durably renamed into place, so it can never run ahead of disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::location::EntityLocation;
use crate::step::DataType;
use crate::storage::traits::{
    check_monotonic, AppliedVersion, LedgerProvider, LedgerScope, StorageError, VersionLedger,
};
use crate::version::Version;

use super::atomic::{atomic_write, remove_stale_temp_files};
use super::codec;
use super::file_lock::FileLock;
use super::LedgerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerRow {
    version: Version,
    applied_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerDocument {
    scope: LedgerScope,
    records: BTreeMap<DataType, LedgerRow>,
}

/// Reads a codec document, mapping malformed content to `Corrupted`.
pub(super) fn read_document<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    codec::decode_document(&bytes)
        .map(Some)
        .map_err(|e| StorageError::Corrupted(format!("{}: {e}", path.display())))
}

/// Acquires the per-file lock when enabled in `config`.
pub(super) fn acquire_lock(
    dir: &Path,
    file_name: &str,
    config: &LedgerConfig,
) -> Result<Option<FileLock>, StorageError> {
    if !config.lock {
        return Ok(None);
    }
    FileLock::acquire(dir, &format!("{file_name}.lock")).map(Some)
}

/// [`VersionLedger`] stored in a single file.
#[derive(Debug)]
pub struct FileLedger {
    scope: LedgerScope,
    path: PathBuf,
    sync_on_write: bool,
    rows: RwLock<BTreeMap<DataType, LedgerRow>>,
    _lock: Option<FileLock>,
}

impl FileLedger {
    /// Opens (or prepares to create) the ledger at `dir/config.file_name`.
    ///
    /// The file itself is only written on the first `set`. `config` must
    /// already be validated.
    ///
    /// # Errors
    /// - `Locked`: another process holds the ledger
    /// - `Corrupted`: the file exists but fails validation
    /// - `Io`: the directory cannot be created or read
    pub(crate) fn open(
        dir: &Path,
        scope: LedgerScope,
        config: &LedgerConfig,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let lock = acquire_lock(dir, &config.file_name, config)?;

        let path = dir.join(&config.file_name);
        remove_stale_temp_files(&path)?;

        let rows = match read_document::<LedgerDocument>(&path)? {
            Some(doc) => {
                if doc.scope != scope {
                    warn!(
                        path = %path.display(),
                        stored = %doc.scope,
                        opened_as = %scope,
                        "ledger scope differs from stored scope; adopting new scope"
                    );
                }
                doc.records
            }
            None => BTreeMap::new(),
        };
        debug!(path = %path.display(), scope = %scope, rows = rows.len(), "opened ledger");

        Ok(Self {
            scope,
            path,
            sync_on_write: config.sync_on_write,
            rows: RwLock::new(rows),
            _lock: lock,
        })
    }

    /// Path of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VersionLedger for FileLedger {
    fn scope(&self) -> &LedgerScope {
        &self.scope
    }

    fn get(&self, data_type: &DataType) -> Result<Option<Version>, StorageError> {
        let rows = self.rows.read().map_err(|_| StorageError::poisoned("file ledger"))?;
        Ok(rows.get(data_type).map(|row| row.version.clone()))
    }

    fn set(&self, data_type: &DataType, version: &Version) -> Result<(), StorageError> {
        let mut rows = self.rows.write().map_err(|_| StorageError::poisoned("file ledger"))?;
        if !check_monotonic(data_type, rows.get(data_type).map(|row| &row.version), version)? {
            return Ok(());
        }

        let mut records = rows.clone();
        records.insert(
            data_type.clone(),
            LedgerRow {
                version: version.clone(),
                applied_at: Utc::now(),
            },
        );
        let doc = LedgerDocument {
            scope: self.scope.clone(),
            records,
        };
        let bytes = codec::encode_document(&doc)?;
        atomic_write(&self.path, &bytes, self.sync_on_write)?;

        *rows = doc.records;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AppliedVersion>, StorageError> {
        let rows = self.rows.read().map_err(|_| StorageError::poisoned("file ledger"))?;
        Ok(rows
            .iter()
            .map(|(data_type, row)| AppliedVersion {
                data_type: data_type.clone(),
                entity_id: self.scope.entity_id().cloned(),
                version: row.version.clone(),
                applied_at: row.applied_at,
            })
            .collect())
    }
}

/// Opens entity ledgers inside each entity's own storage directory.
///
/// The ledger of an entity lives at
/// `<storage_path>/<entity_ledger_dir>/<file_name>`.
#[derive(Debug, Clone, Default)]
pub struct FileLedgerProvider {
    config: LedgerConfig,
}

impl FileLedgerProvider {
    /// Creates a provider with the given configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if `config` is invalid; in particular an
    /// `entity_ledger_dir` that is not a plain directory name would place
    /// ledgers outside the entity's storage path.
    pub fn new(config: LedgerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            config: config.validate()?,
        })
    }

    /// Directory holding the ledger of `location`.
    #[must_use]
    pub fn ledger_dir(&self, location: &EntityLocation) -> PathBuf {
        location.storage_path.join(&self.config.entity_ledger_dir)
    }
}

impl LedgerProvider for FileLedgerProvider {
    fn entity_ledger(
        &self,
        location: &EntityLocation,
    ) -> Result<Box<dyn VersionLedger>, StorageError> {
        if !location.storage_path.is_dir() {
            return Err(StorageError::BackendError(format!(
                "storage path of entity '{}' is not a directory: {}",
                location.entity_id,
                location.storage_path.display()
            )));
        }
        let ledger = FileLedger::open(
            &self.ledger_dir(location),
            LedgerScope::Entity(location.entity_id.clone()),
            &self.config,
        )?;
        Ok(Box::new(ledger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::EntityId;
    use tempfile::tempdir;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_open_empty_does_not_create_file() {
        let dir = tempdir().unwrap();
        let ledger = FileLedger::open(dir.path(), LedgerScope::Global, &LedgerConfig::default()).unwrap();
        assert!(ledger.get(&DataType::new("users")).unwrap().is_none());
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_set_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let config = LedgerConfig::default();
        let users = DataType::new("users");
        {
            let ledger = FileLedger::open(dir.path(), LedgerScope::Global, &config).unwrap();
            ledger.set(&users, &v("1.0")).unwrap();
            ledger.set(&users, &v("2.0-beta1")).unwrap();
        }

        let ledger = FileLedger::open(dir.path(), LedgerScope::Global, &config).unwrap();
        assert_eq!(ledger.get(&users).unwrap(), Some(v("2.0.0-beta1")));
        assert_eq!(ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_regression_leaves_file_unchanged() {
        let dir = tempdir().unwrap();
        let config = LedgerConfig::default();
        let users = DataType::new("users");
        let ledger = FileLedger::open(dir.path(), LedgerScope::Global, &config).unwrap();
        ledger.set(&users, &v("2.0")).unwrap();
        let before = fs::read(ledger.path()).unwrap();

        assert!(ledger.set(&users, &v("1.0")).is_err());
        assert_eq!(fs::read(ledger.path()).unwrap(), before);
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let config = LedgerConfig::default();
        let _first = FileLedger::open(dir.path(), LedgerScope::Global, &config).unwrap();
        let err = FileLedger::open(dir.path(), LedgerScope::Global, &config).unwrap_err();
        assert!(matches!(err, StorageError::Locked(_)));
    }

    #[test]
    fn test_lock_can_be_disabled() {
        let dir = tempdir().unwrap();
        let config = LedgerConfig {
            lock: false,
            ..LedgerConfig::default()
        };
        let _first = FileLedger::open(dir.path(), LedgerScope::Global, &config).unwrap();
        FileLedger::open(dir.path(), LedgerScope::Global, &config).unwrap();
    }

    #[test]
    fn test_provider_places_ledger_under_entity() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo-1");
        fs::create_dir(&repo).unwrap();
        let provider = FileLedgerProvider::default();
        let location = EntityLocation::new("repo-1", &repo);

        {
            let ledger = provider.entity_ledger(&location).unwrap();
            assert_eq!(ledger.scope().entity_id(), Some(&EntityId::new("repo-1")));
            ledger.set(&DataType::new("config"), &v("1.5")).unwrap();
        }

        let expected = repo.join(".migrations").join("applied-versions.ledger");
        assert!(expected.exists());
    }

    #[test]
    fn test_provider_rejects_path_like_ledger_dir() {
        for bad in ["../escaped", "nested/dir", ".."] {
            let config = LedgerConfig {
                entity_ledger_dir: bad.to_string(),
                ..LedgerConfig::default()
            };
            let err = FileLedgerProvider::new(config).unwrap_err();
            assert!(matches!(err, ConfigError::NotAFileName { .. }), "{bad}");
        }
    }

    #[test]
    fn test_provider_with_custom_dir_stays_inside_entity() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo-2");
        fs::create_dir(&repo).unwrap();
        let provider = FileLedgerProvider::new(LedgerConfig {
            entity_ledger_dir: "_upgrade".to_string(),
            ..LedgerConfig::default()
        })
        .unwrap();

        let location = EntityLocation::new("repo-2", &repo);
        provider
            .entity_ledger(&location)
            .unwrap()
            .set(&DataType::new("config"), &v("1.0"))
            .unwrap();
        assert!(repo.join("_upgrade").join("applied-versions.ledger").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_provider_rejects_missing_storage() {
        let dir = tempdir().unwrap();
        let provider = FileLedgerProvider::default();
        let location = EntityLocation::new("gone", dir.path().join("gone"));
        assert!(provider.entity_ledger(&location).is_err());
    }
}
