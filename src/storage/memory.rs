//! In-memory ledger backend.
//!
//! Thread-safe implementations of the ledger traits. Intended for embedded
//! usage, tests, and as a reference implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::location::{EntityId, EntityLocation};
use crate::step::DataType;
use crate::storage::traits::{
    check_monotonic, AppliedVersion, LedgerProvider, LedgerScope, StorageError, StrategyLedger,
    VersionLedger,
};
use crate::strategy::{MigrationStrategy, StrategyChoice};
use crate::version::Version;

/// In-memory [`VersionLedger`].
///
/// Clones share the same underlying rows.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    scope: LedgerScope,
    rows: Arc<RwLock<BTreeMap<DataType, (Version, DateTime<Utc>)>>>,
}

impl MemoryLedger {
    /// Creates an empty ledger for `scope`.
    #[must_use]
    pub fn new(scope: LedgerScope) -> Self {
        Self {
            scope,
            rows: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Creates an empty global ledger.
    #[must_use]
    pub fn global() -> Self {
        Self::new(LedgerScope::Global)
    }
}

impl VersionLedger for MemoryLedger {
    fn scope(&self) -> &LedgerScope {
        &self.scope
    }

    fn get(&self, data_type: &DataType) -> Result<Option<Version>, StorageError> {
        let rows = self.rows.read().map_err(|_| StorageError::poisoned("memory ledger"))?;
        Ok(rows.get(data_type).map(|(v, _)| v.clone()))
    }

    fn set(&self, data_type: &DataType, version: &Version) -> Result<(), StorageError> {
        let mut rows = self.rows.write().map_err(|_| StorageError::poisoned("memory ledger"))?;
        if check_monotonic(data_type, rows.get(data_type).map(|(v, _)| v), version)? {
            rows.insert(data_type.clone(), (version.clone(), Utc::now()));
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AppliedVersion>, StorageError> {
        let rows = self.rows.read().map_err(|_| StorageError::poisoned("memory ledger"))?;
        Ok(rows
            .iter()
            .map(|(data_type, (version, applied_at))| AppliedVersion {
                data_type: data_type.clone(),
                entity_id: self.scope.entity_id().cloned(),
                version: version.clone(),
                applied_at: *applied_at,
            })
            .collect())
    }
}

/// Hands out one shared [`MemoryLedger`] per entity.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedgerProvider {
    ledgers: Arc<RwLock<HashMap<EntityId, MemoryLedger>>>,
}

impl MemoryLedgerProvider {
    /// Returns the ledger of `entity_id`, creating it if needed.
    ///
    /// # Errors
    /// Fails only if the internal lock is poisoned.
    pub fn ledger(&self, entity_id: &EntityId) -> Result<MemoryLedger, StorageError> {
        let mut ledgers = self
            .ledgers
            .write()
            .map_err(|_| StorageError::poisoned("ledger provider"))?;
        Ok(ledgers
            .entry(entity_id.clone())
            .or_insert_with(|| MemoryLedger::new(LedgerScope::Entity(entity_id.clone())))
            .clone())
    }
}

impl LedgerProvider for MemoryLedgerProvider {
    fn entity_ledger(
        &self,
        location: &EntityLocation,
    ) -> Result<Box<dyn VersionLedger>, StorageError> {
        Ok(Box::new(self.ledger(&location.entity_id)?))
    }
}

/// In-memory [`StrategyLedger`].
#[derive(Debug, Default)]
pub struct MemoryStrategyLedger {
    choices: RwLock<BTreeMap<EntityId, StrategyChoice>>,
}

impl StrategyLedger for MemoryStrategyLedger {
    fn get(&self, entity_id: &EntityId) -> Result<Option<StrategyChoice>, StorageError> {
        let choices = self.choices.read().map_err(|_| StorageError::poisoned("strategy ledger"))?;
        Ok(choices.get(entity_id).cloned())
    }

    fn set(
        &self,
        entity_id: &EntityId,
        strategy: MigrationStrategy,
    ) -> Result<StrategyChoice, StorageError> {
        let mut choices = self.choices.write().map_err(|_| StorageError::poisoned("strategy ledger"))?;
        if choices.contains_key(entity_id) {
            return Err(StorageError::DuplicateKey(entity_id.to_string()));
        }
        let choice = StrategyChoice::now(entity_id.clone(), strategy);
        choices.insert(entity_id.clone(), choice.clone());
        Ok(choice)
    }

    fn list(&self) -> Result<Vec<StrategyChoice>, StorageError> {
        let choices = self.choices.read().map_err(|_| StorageError::poisoned("strategy ledger"))?;
        Ok(choices.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_get_absent() {
        let ledger = MemoryLedger::global();
        assert!(ledger.get(&DataType::new("users")).unwrap().is_none());
    }

    #[test]
    fn test_set_advances_and_rejects_regression() {
        let ledger = MemoryLedger::global();
        let users = DataType::new("users");
        ledger.set(&users, &v("1.0")).unwrap();
        ledger.set(&users, &v("1.1-RC1")).unwrap();
        assert_eq!(ledger.get(&users).unwrap(), Some(v("1.1.0-RC1")));

        let err = ledger.set(&users, &v("1.0.5")).unwrap_err();
        assert!(matches!(err, StorageError::VersionRegression { .. }));
        assert_eq!(ledger.get(&users).unwrap(), Some(v("1.1.0-RC1")));
    }

    #[test]
    fn test_entries_sorted_with_scope() {
        let ledger = MemoryLedger::new(LedgerScope::Entity(EntityId::new("r1")));
        ledger.set(&DataType::new("b"), &v("2.0")).unwrap();
        ledger.set(&DataType::new("a"), &v("1.0")).unwrap();
        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].data_type.as_str(), "a");
        assert_eq!(entries[0].entity_id, Some(EntityId::new("r1")));
    }

    #[test]
    fn test_provider_shares_ledger_per_entity() {
        let provider = MemoryLedgerProvider::default();
        let location = EntityLocation::new("r1", "/tmp/r1");
        let opened = provider.entity_ledger(&location).unwrap();
        opened.set(&DataType::new("config"), &v("3.0")).unwrap();

        let again = provider.ledger(&EntityId::new("r1")).unwrap();
        assert_eq!(again.get(&DataType::new("config")).unwrap(), Some(v("3.0")));
        assert!(provider
            .ledger(&EntityId::new("r2"))
            .unwrap()
            .get(&DataType::new("config"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let ledger = MemoryLedger::global();
        let shared = ledger.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.rows.write().unwrap();
            panic!("writer died mid-update");
        })
        .join();

        let users = DataType::new("users");
        assert!(matches!(ledger.get(&users), Err(StorageError::LockPoisoned(_))));
        assert!(matches!(ledger.set(&users, &v("1.0")), Err(StorageError::LockPoisoned(_))));
    }

    #[test]
    fn test_strategy_never_overwritten() {
        let ledger = MemoryStrategyLedger::default();
        let id = EntityId::new("r1");
        ledger.set(&id, MigrationStrategy::Inline).unwrap();
        let err = ledger.set(&id, MigrationStrategy::Copy).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));
        assert_eq!(ledger.get(&id).unwrap().unwrap().strategy, MigrationStrategy::Inline);
        assert_eq!(ledger.list().unwrap().len(), 1);
    }
}
