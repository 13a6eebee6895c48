//! Embedded relational backend, backed by SQLite.
//!
//! The portability fallback: slower than the key-value engine but available
//! everywhere and inspectable with standard SQL tooling. One `attributes`
//! table keyed on the full triple gives idempotence; a secondary index covers
//! the reverse lookup.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params};

use crate::error::StoreError;
use crate::model::{CacheState, EtextId, Triple};
use crate::store::{MetadataStore, StoreResult};
use crate::vocabulary::Predicate;

const DB_FILE: &str = "metadata.sqlite3";
const STATE_KEY: &str = "cache_state";

/// Embedded relational metadata store.
///
/// Uses a `Mutex<Connection>` for thread safety; WAL mode and a busy timeout
/// keep concurrent readers graceful. No writes occur after population, so the
/// mutex is uncontended on the query path in practice.
pub struct RelationalStore {
    conn: Mutex<Connection>,
    location: PathBuf,
}

impl RelationalStore {
    /// Open or create the store inside the given directory.
    pub fn open(location: &Path) -> StoreResult<Self> {
        let unavailable = |reason: String| StoreError::Unavailable {
            backend: "embedded_relational",
            location: location.display().to_string(),
            reason,
        };
        std::fs::create_dir_all(location).map_err(|e| unavailable(e.to_string()))?;
        let conn = Connection::open(location.join(DB_FILE))
            .map_err(|e| unavailable(e.to_string()))?;

        let store = Self {
            conn: Mutex::new(conn),
            location: location.to_path_buf(),
        };
        store.initialize()?;
        Ok(store)
    }

    /// In-memory store, for tests and the backend-equivalence checks.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        let store = Self {
            conn: Mutex::new(conn),
            location: PathBuf::from(":memory:"),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Where the store lives on disk.
    pub fn location(&self) -> &Path {
        &self.location
    }

    fn initialize(&self) -> StoreResult<()> {
        let conn = self.lock();
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS attributes (
                 etext     INTEGER NOT NULL,
                 predicate TEXT    NOT NULL,
                 value     TEXT    NOT NULL,
                 PRIMARY KEY (etext, predicate, value)
             ) WITHOUT ROWID;
             CREATE INDEX IF NOT EXISTS idx_attributes_reverse
                 ON attributes (predicate, value, etext);
             CREATE TABLE IF NOT EXISTS cache_meta (
                 key   TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );",
        )
        .map_err(sql_err)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("sqlite connection mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn sql_err(e: rusqlite::Error) -> StoreError {
    StoreError::Sqlite {
        message: e.to_string(),
    }
}

impl MetadataStore for RelationalStore {
    fn put_batch(&self, triples: &[Triple]) -> StoreResult<()> {
        let mut conn = self.lock();
        let txn = conn.transaction().map_err(sql_err)?;
        {
            let mut stmt = txn
                .prepare_cached(
                    "INSERT OR IGNORE INTO attributes (etext, predicate, value)
                     VALUES (?1, ?2, ?3)",
                )
                .map_err(sql_err)?;
            for t in triples {
                stmt.execute(params![t.etext.get() as i64, t.predicate.name(), t.value])
                    .map_err(sql_err)?;
            }
        }
        txn.commit().map_err(sql_err)?;
        Ok(())
    }

    fn get_attributes(
        &self,
        etext: EtextId,
    ) -> StoreResult<std::collections::BTreeSet<(Predicate, String)>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached("SELECT predicate, value FROM attributes WHERE etext = ?1")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![etext.get() as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(sql_err)?;

        let mut attrs = std::collections::BTreeSet::new();
        for row in rows {
            let (pred, value) = row.map_err(sql_err)?;
            if let Ok(predicate) = pred.parse::<Predicate>() {
                attrs.insert((predicate, value));
            }
        }
        Ok(attrs)
    }

    fn find_etexts(
        &self,
        predicate: Predicate,
        value: &str,
    ) -> StoreResult<std::collections::BTreeSet<EtextId>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT etext FROM attributes WHERE predicate = ?1 AND value = ?2",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![predicate.name(), value], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(sql_err)?;

        let mut ids = std::collections::BTreeSet::new();
        for row in rows {
            let raw = row.map_err(sql_err)?;
            if let Some(id) = u64::try_from(raw).ok().and_then(EtextId::new) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    fn list_predicates(&self) -> StoreResult<std::collections::BTreeSet<Predicate>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached("SELECT DISTINCT predicate FROM attributes")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql_err)?;

        let mut predicates = std::collections::BTreeSet::new();
        for row in rows {
            if let Ok(predicate) = row.map_err(sql_err)?.parse::<Predicate>() {
                predicates.insert(predicate);
            }
        }
        Ok(predicates)
    }

    fn state(&self) -> StoreResult<CacheState> {
        let conn = self.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = ?1",
                params![STATE_KEY],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sql_err(other)),
            })?;

        match raw {
            Some(raw) => CacheState::parse(&raw).ok_or_else(|| StoreError::Corrupt {
                message: format!("unrecognized state marker \"{raw}\""),
            }),
            None => Ok(CacheState::Empty),
        }
    }

    fn set_state(&self, state: CacheState) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO cache_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![STATE_KEY, state.as_str()],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute_batch("DELETE FROM attributes; DELETE FROM cache_meta;")
            .map_err(sql_err)?;
        Ok(())
    }
}

impl std::fmt::Debug for RelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalStore")
            .field("location", &self.location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract_tests;
    use tempfile::TempDir;

    #[test]
    fn satisfies_store_contract() {
        let store = RelationalStore::in_memory().unwrap();
        contract_tests::exercise(&store);
    }

    #[test]
    fn satisfies_store_contract_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = RelationalStore::open(dir.path()).unwrap();
        contract_tests::exercise(&store);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RelationalStore::open(dir.path()).unwrap();
            store.set_state(CacheState::Failed).unwrap();
        }
        let store = RelationalStore::open(dir.path()).unwrap();
        assert_eq!(store.state().unwrap(), CacheState::Failed);
    }

    #[test]
    fn batch_is_atomic_under_duplicate_keys() {
        let store = RelationalStore::in_memory().unwrap();
        let id = EtextId::new(84).unwrap();
        // Duplicates inside one batch collapse rather than erroring.
        store
            .put_batch(&[
                Triple::new(id, Predicate::Title, "Frankenstein"),
                Triple::new(id, Predicate::Title, "Frankenstein"),
            ])
            .unwrap();
        assert_eq!(store.get_attributes(id).unwrap().len(), 1);
    }
}
