//! Embedded ordered key-value backend, backed by redb.
//!
//! The preferred backend: a single local file, ACID transactions, fast bulk
//! writes. The forward and reverse indices are two tables whose composite
//! keys are the triple itself, so idempotence falls out of key uniqueness and
//! both lookup directions are prefix range scans.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::model::{CacheState, EtextId, Triple};
use crate::store::{MetadataStore, StoreResult};
use crate::vocabulary::Predicate;

/// Forward index: `(etext, predicate, value) -> ()`.
const FORWARD: TableDefinition<(u64, &str, &str), ()> = TableDefinition::new("forward");
/// Reverse index: `(predicate, value, etext) -> ()`.
const REVERSE: TableDefinition<(&str, &str, u64), ()> = TableDefinition::new("reverse");
/// Distinct predicates present in the data tables.
const PREDICATES: TableDefinition<&str, ()> = TableDefinition::new("predicates");
/// Lifecycle metadata (string keys → string values).
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

const STATE_KEY: &str = "cache_state";
const DB_FILE: &str = "metadata.redb";

/// Embedded key-value metadata store.
///
/// Writes go through one transaction per batch; reads use MVCC snapshots and
/// need no locking.
pub struct KvStore {
    db: Arc<Database>,
}

impl KvStore {
    /// Open or create the store inside the given directory.
    ///
    /// Failure to open is a [`StoreError::Unavailable`]: the caller decides
    /// whether to surface it or fall back to another backend at selection
    /// time. There is no fallback here.
    pub fn open(location: &Path) -> StoreResult<Self> {
        let unavailable = |reason: String| StoreError::Unavailable {
            backend: "embedded_kv",
            location: location.display().to_string(),
            reason,
        };
        std::fs::create_dir_all(location).map_err(|e| unavailable(e.to_string()))?;
        let db = Database::create(location.join(DB_FILE))
            .map_err(|e| unavailable(e.to_string()))?;

        let store = Self { db: Arc::new(db) };
        // Create all tables up front so reads never see a missing table.
        store.with_write(|txn| {
            txn.open_table(FORWARD).map_err(kv_err)?;
            txn.open_table(REVERSE).map_err(kv_err)?;
            txn.open_table(PREDICATES).map_err(kv_err)?;
            txn.open_table(META).map_err(kv_err)?;
            Ok(())
        })?;
        Ok(store)
    }

    fn with_write<T>(
        &self,
        f: impl FnOnce(&redb::WriteTransaction) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let txn = self.db.begin_write().map_err(kv_err)?;
        let result = f(&txn)?;
        txn.commit().map_err(kv_err)?;
        Ok(result)
    }
}

fn kv_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Kv {
        message: e.to_string(),
    }
}

impl MetadataStore for KvStore {
    fn put_batch(&self, triples: &[Triple]) -> StoreResult<()> {
        self.with_write(|txn| {
            let mut forward = txn.open_table(FORWARD).map_err(kv_err)?;
            let mut reverse = txn.open_table(REVERSE).map_err(kv_err)?;
            let mut predicates = txn.open_table(PREDICATES).map_err(kv_err)?;
            for t in triples {
                let pred = t.predicate.name();
                forward
                    .insert((t.etext.get(), pred, t.value.as_str()), ())
                    .map_err(kv_err)?;
                reverse
                    .insert((pred, t.value.as_str(), t.etext.get()), ())
                    .map_err(kv_err)?;
                predicates.insert(pred, ()).map_err(kv_err)?;
            }
            Ok(())
        })
    }

    fn get_attributes(
        &self,
        etext: EtextId,
    ) -> StoreResult<std::collections::BTreeSet<(Predicate, String)>> {
        let txn = self.db.begin_read().map_err(kv_err)?;
        let table = txn.open_table(FORWARD).map_err(kv_err)?;

        let id = etext.get();
        let mut attrs = std::collections::BTreeSet::new();
        let lower = (id, "", "");
        let iter = match id.checked_add(1) {
            Some(next) => table.range(lower..(next, "", "")).map_err(kv_err)?,
            None => table.range(lower..).map_err(kv_err)?,
        };
        for entry in iter {
            let (key, _) = entry.map_err(kv_err)?;
            let (_, pred, value) = key.value();
            if let Ok(predicate) = pred.parse::<Predicate>() {
                attrs.insert((predicate, value.to_string()));
            }
        }
        Ok(attrs)
    }

    fn find_etexts(
        &self,
        predicate: Predicate,
        value: &str,
    ) -> StoreResult<std::collections::BTreeSet<EtextId>> {
        let txn = self.db.begin_read().map_err(kv_err)?;
        let table = txn.open_table(REVERSE).map_err(kv_err)?;

        let pred = predicate.name();
        let mut ids = std::collections::BTreeSet::new();
        let iter = table
            .range((pred, value, 0)..=(pred, value, u64::MAX))
            .map_err(kv_err)?;
        for entry in iter {
            let (key, _) = entry.map_err(kv_err)?;
            let (_, _, raw) = key.value();
            if let Some(id) = EtextId::new(raw) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    fn list_predicates(&self) -> StoreResult<std::collections::BTreeSet<Predicate>> {
        let txn = self.db.begin_read().map_err(kv_err)?;
        let table = txn.open_table(PREDICATES).map_err(kv_err)?;

        let mut predicates = std::collections::BTreeSet::new();
        for entry in table.iter().map_err(kv_err)? {
            let (key, _) = entry.map_err(kv_err)?;
            if let Ok(predicate) = key.value().parse::<Predicate>() {
                predicates.insert(predicate);
            }
        }
        Ok(predicates)
    }

    fn state(&self) -> StoreResult<CacheState> {
        let txn = self.db.begin_read().map_err(kv_err)?;
        let table = txn.open_table(META).map_err(kv_err)?;
        match table.get(STATE_KEY).map_err(kv_err)? {
            Some(guard) => {
                let raw = guard.value().to_string();
                CacheState::parse(&raw).ok_or_else(|| StoreError::Corrupt {
                    message: format!("unrecognized state marker \"{raw}\""),
                })
            }
            None => Ok(CacheState::Empty),
        }
    }

    fn set_state(&self, state: CacheState) -> StoreResult<()> {
        self.with_write(|txn| {
            let mut table = txn.open_table(META).map_err(kv_err)?;
            table.insert(STATE_KEY, state.as_str()).map_err(kv_err)?;
            Ok(())
        })
    }

    fn clear(&self) -> StoreResult<()> {
        self.with_write(|txn| {
            txn.delete_table(FORWARD).map_err(kv_err)?;
            txn.delete_table(REVERSE).map_err(kv_err)?;
            txn.delete_table(PREDICATES).map_err(kv_err)?;
            txn.delete_table(META).map_err(kv_err)?;
            // Recreate so subsequent reads find empty tables.
            txn.open_table(FORWARD).map_err(kv_err)?;
            txn.open_table(REVERSE).map_err(kv_err)?;
            txn.open_table(PREDICATES).map_err(kv_err)?;
            txn.open_table(META).map_err(kv_err)?;
            Ok(())
        })
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract_tests;
    use tempfile::TempDir;

    #[test]
    fn satisfies_store_contract() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        contract_tests::exercise(&store);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = KvStore::open(dir.path()).unwrap();
            store.set_state(CacheState::Populated).unwrap();
        }
        let store = KvStore::open(dir.path()).unwrap();
        assert_eq!(store.state().unwrap(), CacheState::Populated);
    }

    #[test]
    fn triples_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let id = EtextId::new(2701).unwrap();
        {
            let store = KvStore::open(dir.path()).unwrap();
            store
                .put_batch(&[Triple::new(id, Predicate::Title, "Moby Dick; Or, The Whale")])
                .unwrap();
        }
        let store = KvStore::open(dir.path()).unwrap();
        let attrs = store.get_attributes(id).unwrap();
        assert!(attrs.contains(&(Predicate::Title, "Moby Dick; Or, The Whale".to_string())));
    }

    #[test]
    fn open_on_unwritable_location_is_unavailable() {
        let dir = TempDir::new().unwrap();
        // A file where the directory should be.
        let path = dir.path().join("blocked");
        std::fs::write(&path, b"x").unwrap();
        let err = KvStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { backend: "embedded_kv", .. }));
    }
}
