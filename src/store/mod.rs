//! Backend-abstracted persistent metadata store.
//!
//! Three interchangeable backends satisfy the [`MetadataStore`] contract:
//!
//! - [`kv::KvStore`] — embedded ordered key-value store (redb); fast,
//!   single-writer, local file
//! - [`relational::RelationalStore`] — embedded SQLite file; portable,
//!   SQL-queryable, slower fallback
//! - [`remote::RemoteStore`] — remote SPARQL triple-store over HTTP
//!
//! Backend choice affects performance and deployment, never query results:
//! for a given corpus the observable triple set is identical across backends,
//! and the forward (`id → attributes`) and reverse (`(predicate, value) →
//! ids`) indices stay mutually consistent.

pub mod kv;
pub mod relational;
pub mod remote;

use std::collections::BTreeSet;

use crate::error::StoreError;
use crate::model::{CacheState, EtextId, Triple};
use crate::vocabulary::Predicate;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Contract every storage backend must satisfy.
///
/// All operations are `&self`: reads are safe for unbounded concurrent
/// callers, and writes only happen during the single-writer population phase.
pub trait MetadataStore: Send + Sync + std::fmt::Debug {
    /// Durably persist a batch of triples.
    ///
    /// Idempotent per triple (re-inserting an existing triple changes
    /// nothing) and atomic per call: either the whole batch lands or none of
    /// it does. Batches are bounded, so the corpus never has to fit in
    /// memory.
    fn put_batch(&self, triples: &[Triple]) -> StoreResult<()>;

    /// All `(predicate, value)` attributes of an entity.
    ///
    /// An unknown id yields the empty set; that is a normal outcome, not an
    /// error.
    fn get_attributes(&self, etext: EtextId) -> StoreResult<BTreeSet<(Predicate, String)>>;

    /// Exact-match reverse lookup: all entities carrying `(predicate, value)`.
    fn find_etexts(&self, predicate: Predicate, value: &str) -> StoreResult<BTreeSet<EtextId>>;

    /// All distinct predicates currently present in the store.
    fn list_predicates(&self) -> StoreResult<BTreeSet<Predicate>>;

    /// The persisted lifecycle state.
    fn state(&self) -> StoreResult<CacheState>;

    /// Persist a new lifecycle state.
    fn set_state(&self, state: CacheState) -> StoreResult<()>;

    /// Drop all triples and reset the state to [`CacheState::Empty`].
    ///
    /// Used to rebuild a failed population from scratch and by `refresh`.
    fn clear(&self) -> StoreResult<()>;

    /// Whether a full population run has completed.
    fn is_populated(&self) -> StoreResult<bool> {
        Ok(self.state()? == CacheState::Populated)
    }

    /// Record that a full population run completed successfully.
    fn mark_populated(&self) -> StoreResult<()> {
        self.set_state(CacheState::Populated)
    }
}
