//! Core data model for the metadata cache.
//!
//! An [`EtextId`] identifies one catalog record, a [`Triple`] is one
//! `(entity, predicate, value)` fact, and [`CacheState`] tracks the one-shot
//! population lifecycle.

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::vocabulary::Predicate;

/// Unique, niche-optimized identifier for a catalog entity (an "etext").
///
/// Uses `NonZeroU64` so that `Option<EtextId>` is the same size as `EtextId`;
/// the corpus's canonical identifiers are positive integers, so zero doubles
/// as the invalid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EtextId(NonZeroU64);

impl EtextId {
    /// Create an `EtextId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(EtextId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for EtextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "etext:{}", self.0)
    }
}

/// One normalized `(entity, predicate, value)` fact from the catalog.
///
/// Multi-valued predicates (e.g. several subjects) yield several triples
/// sharing an etext id. Triples are set-valued: inserting the same triple
/// twice leaves every backend unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub etext: EtextId,
    pub predicate: Predicate,
    pub value: String,
}

impl Triple {
    pub fn new(etext: EtextId, predicate: Predicate, value: impl Into<String>) -> Self {
        Self {
            etext,
            predicate,
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, \"{}\")", self.etext, self.predicate, self.value)
    }
}

/// Lifecycle state of the cache, persisted inside each backend.
///
/// An explicit four-state value rather than a boolean so that a failed
/// population attempt is distinguishable from one that never ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheState {
    /// No population has ever been attempted.
    Empty,
    /// A population run is in flight; contents are partial.
    Populating,
    /// A full ingestion run completed; the cache is read-only from here on.
    Populated,
    /// A population run aborted mid-stream; contents are indeterminate and
    /// must be rebuilt from scratch.
    Failed,
}

impl CacheState {
    /// Stable string form used by every backend's persisted state marker.
    pub fn as_str(self) -> &'static str {
        match self {
            CacheState::Empty => "empty",
            CacheState::Populating => "populating",
            CacheState::Populated => "populated",
            CacheState::Failed => "failed",
        }
    }

    /// Parse the persisted string form. Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "empty" => Some(CacheState::Empty),
            "populating" => Some(CacheState::Populating),
            "populated" => Some(CacheState::Populated),
            "failed" => Some(CacheState::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
