//! The fixed metadata vocabulary and its RDF namespace mapping.
//!
//! The corpus describes each work with a small closed set of predicates drawn
//! from the Dublin Core (`dcterms`) and Project Gutenberg (`pgterms`)
//! namespaces. [`Predicate`] is the cache's normalized view of that set.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `http://purl.org/dc/terms/`
pub const DCTERMS: &str = "http://purl.org/dc/terms/";
/// `http://www.gutenberg.org/2009/pgterms/`
pub const PGTERMS: &str = "http://www.gutenberg.org/2009/pgterms/";
/// `http://www.w3.org/1999/02/22-rdf-syntax-ns#`
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
/// Prefix of the entity IRIs identifying works in the catalog.
pub const EBOOK_NS: &str = "http://www.gutenberg.org/ebooks/";

/// An attribute name from the fixed, enumerable metadata vocabulary.
///
/// The set is closed: every triple in the cache carries one of these. It is
/// also discoverable at query time via `list_supported_predicates`, which
/// reports the subset actually present in the populated store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    Title,
    Author,
    Language,
    Subject,
    Rights,
    FormatUri,
}

impl Predicate {
    /// All members of the vocabulary, in display order.
    pub const ALL: [Predicate; 6] = [
        Predicate::Title,
        Predicate::Author,
        Predicate::Language,
        Predicate::Subject,
        Predicate::Rights,
        Predicate::FormatUri,
    ];

    /// The user-facing feature name (also the persisted form in every backend).
    pub fn name(self) -> &'static str {
        match self {
            Predicate::Title => "title",
            Predicate::Author => "author",
            Predicate::Language => "language",
            Predicate::Subject => "subject",
            Predicate::Rights => "rights",
            Predicate::FormatUri => "formaturi",
        }
    }

    /// The RDF property IRI this predicate normalizes.
    ///
    /// `Author`, `Language`, and `Subject` are two-hop paths in the raw
    /// catalog (see [`crate::catalog`]); the IRI here is the first hop, which
    /// is what the remote triple-store stores for the already-normalized
    /// triples.
    pub fn iri(self) -> String {
        match self {
            Predicate::Title => format!("{DCTERMS}title"),
            Predicate::Author => format!("{DCTERMS}creator"),
            Predicate::Language => format!("{DCTERMS}language"),
            Predicate::Subject => format!("{DCTERMS}subject"),
            Predicate::Rights => format!("{DCTERMS}rights"),
            Predicate::FormatUri => format!("{DCTERMS}hasFormat"),
        }
    }

    /// Reverse of [`Predicate::iri`].
    pub fn from_iri(iri: &str) -> Option<Self> {
        Predicate::ALL.into_iter().find(|p| p.iri() == iri)
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for feature names outside the vocabulary.
///
/// The message lists the supported names, mirroring the discoverability of
/// `list_supported_predicates`.
#[derive(Debug, Error, Diagnostic)]
#[error("no metadata predicate named \"{name}\"")]
#[diagnostic(
    code(gutencache::vocabulary::unknown_predicate),
    help("Supported predicates: title, author, language, subject, rights, formaturi.")
)]
pub struct UnknownPredicate {
    pub name: String,
}

impl std::str::FromStr for Predicate {
    type Err = UnknownPredicate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Predicate::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| UnknownPredicate { name: s.to_string() })
    }
}
