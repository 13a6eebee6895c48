//! The public cache facade: lifecycle plus forward and reverse lookup.
//!
//! [`MetadataCache`] owns a configured backend and gates every data query on
//! the populated state, so "the cache was never built" surfaces as
//! [`QueryError::NotPopulated`] instead of a silent empty result. Predicate
//! discovery is the one ungated read, since callers may want to inspect a
//! cache before deciding to build it.

use std::collections::BTreeSet;

use crate::catalog::{CatalogDump, ParseStats};
use crate::config::CacheConfig;
use crate::error::{PopulateError, QueryError, StoreError};
use crate::model::{CacheState, EtextId};
use crate::populate::{CancelToken, PopulateOptions, populate};
use crate::store::MetadataStore;
use crate::vocabulary::Predicate;

/// A metadata cache over one configured backend.
pub struct MetadataCache {
    store: Box<dyn MetadataStore>,
    config: CacheConfig,
}

impl MetadataCache {
    /// Open the backend named by `config`.
    ///
    /// Opening performs no population; a freshly opened cache over an empty
    /// location answers queries with [`QueryError::NotPopulated`].
    pub fn open(config: CacheConfig) -> Result<Self, StoreError> {
        let store = config.open_store()?;
        Ok(Self { store, config })
    }

    /// Wrap an already-open store. Used by embedders and tests that manage
    /// backend construction themselves.
    pub fn from_store(store: Box<dyn MetadataStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current lifecycle state of the underlying store.
    pub fn state(&self) -> Result<CacheState, StoreError> {
        self.store.state()
    }

    pub fn is_populated(&self) -> Result<bool, StoreError> {
        self.store.is_populated()
    }

    fn require_populated(&self) -> Result<(), QueryError> {
        let state = self.store.state()?;
        if state != CacheState::Populated {
            return Err(QueryError::NotPopulated { state });
        }
        Ok(())
    }

    /// All values of `predicate` for one etext.
    ///
    /// An id the corpus never mentions yields an empty set; only an unbuilt
    /// cache is an error.
    pub fn get_metadata(
        &self,
        predicate: Predicate,
        etext: EtextId,
    ) -> Result<BTreeSet<String>, QueryError> {
        self.require_populated()?;
        let attrs = self.store.get_attributes(etext)?;
        Ok(attrs
            .into_iter()
            .filter(|(p, _)| *p == predicate)
            .map(|(_, v)| v)
            .collect())
    }

    /// All attributes of one etext, across every predicate.
    pub fn get_all_metadata(
        &self,
        etext: EtextId,
    ) -> Result<BTreeSet<(Predicate, String)>, QueryError> {
        self.require_populated()?;
        Ok(self.store.get_attributes(etext)?)
    }

    /// Exact-match reverse lookup: every etext carrying `(predicate, value)`.
    ///
    /// Matching is exact on the stored byte sequence. "Shakespeare, William"
    /// finds nothing if the corpus says "Shakespeare, William, 1564-1616".
    pub fn get_etexts(
        &self,
        predicate: Predicate,
        value: &str,
    ) -> Result<BTreeSet<EtextId>, QueryError> {
        self.require_populated()?;
        Ok(self.store.find_etexts(predicate, value)?)
    }

    /// Distinct predicates present in the store. Answerable in any state.
    pub fn list_supported_predicates(&self) -> Result<BTreeSet<Predicate>, StoreError> {
        self.store.list_predicates()
    }

    /// One-shot bulk population from a catalog dump, with default options
    /// and no cancellation.
    pub fn populate(&self, dump: &CatalogDump) -> Result<ParseStats, PopulateError> {
        self.populate_with(dump, &PopulateOptions::default(), &CancelToken::new())
    }

    /// Population with explicit batch sizing and a cancellation token.
    pub fn populate_with(
        &self,
        dump: &CatalogDump,
        options: &PopulateOptions,
        token: &CancelToken,
    ) -> Result<ParseStats, PopulateError> {
        populate(
            self.store.as_ref(),
            dump,
            &self.config.lock_path(),
            options,
            token,
        )
    }

    /// Drop all cached metadata and return to the empty state.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.clear()
    }

    /// Clear and re-populate in one step.
    pub fn refresh(&self, dump: &CatalogDump) -> Result<ParseStats, PopulateError> {
        self.store.clear().map_err(PopulateError::Store)?;
        self.populate(dump)
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("backend", &self.config.backend)
            .field("storage_location", &self.config.storage_location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testutil::{sample_record, tar_of};
    use crate::config::BackendKind;
    use crate::store::relational::RelationalStore;
    use tempfile::TempDir;

    fn moby_dump(dir: &TempDir) -> CatalogDump {
        let record = sample_record(2701, "Moby Dick; Or, The Whale", "Melville, Hermann");
        let path = dir.path().join("rdf-files.tar");
        std::fs::write(&path, tar_of(&[("pg2701.rdf", &record)])).unwrap();
        CatalogDump::open(path)
    }

    fn cache(dir: &TempDir) -> MetadataCache {
        let store = RelationalStore::in_memory().unwrap();
        let config = CacheConfig::new(BackendKind::EmbeddedRelational, dir.path());
        MetadataCache::from_store(Box::new(store), config)
    }

    #[test]
    fn queries_before_population_are_refused() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let id = EtextId::new(2701).unwrap();

        let err = cache.get_metadata(Predicate::Title, id).unwrap_err();
        assert!(matches!(
            err,
            QueryError::NotPopulated {
                state: CacheState::Empty
            }
        ));
        let err = cache.get_etexts(Predicate::Author, "Melville, Hermann").unwrap_err();
        assert!(matches!(err, QueryError::NotPopulated { .. }));

        // Predicate discovery stays available in every state.
        assert!(cache.list_supported_predicates().unwrap().is_empty());
    }

    #[test]
    fn populate_then_query_both_directions() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let dump = moby_dump(&dir);

        cache.populate(&dump).unwrap();
        assert!(cache.is_populated().unwrap());

        let id = EtextId::new(2701).unwrap();
        let titles = cache.get_metadata(Predicate::Title, id).unwrap();
        assert_eq!(titles, BTreeSet::from(["Moby Dick; Or, The Whale".to_string()]));

        let ids = cache.get_etexts(Predicate::Author, "Melville, Hermann").unwrap();
        assert_eq!(ids, BTreeSet::from([id]));
    }

    #[test]
    fn unknown_id_is_an_empty_set_once_populated() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.populate(&moby_dump(&dir)).unwrap();

        let ghost = EtextId::new(999_999_999).unwrap();
        assert!(cache.get_metadata(Predicate::Title, ghost).unwrap().is_empty());
        assert!(cache.get_all_metadata(ghost).unwrap().is_empty());
    }

    #[test]
    fn exact_matching_does_not_do_partial_lookup() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.populate(&moby_dump(&dir)).unwrap();

        assert!(cache.get_etexts(Predicate::Author, "Melville").unwrap().is_empty());
        assert!(cache.get_etexts(Predicate::Title, "moby dick; or, the whale").unwrap().is_empty());
    }

    #[test]
    fn clear_returns_to_the_unpopulated_state() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.populate(&moby_dump(&dir)).unwrap();

        cache.clear().unwrap();
        assert_eq!(cache.state().unwrap(), CacheState::Empty);
        let err = cache
            .get_metadata(Predicate::Title, EtextId::new(2701).unwrap())
            .unwrap_err();
        assert!(matches!(err, QueryError::NotPopulated { .. }));
    }

    #[test]
    fn refresh_rebuilds_a_populated_cache() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let dump = moby_dump(&dir);

        cache.populate(&dump).unwrap();
        let stats = cache.refresh(&dump).unwrap();
        assert_eq!(stats.records, 1);
        assert!(cache.is_populated().unwrap());
    }
}
