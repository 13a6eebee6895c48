//! gutencache: a local metadata cache for a large static bibliographic corpus.
//!
//! The corpus publishes its per-work metadata only as a bulk RDF dump of tens
//! of thousands of records. gutencache ingests that dump once, in an explicit
//! long-running population step, and then answers exact-match lookups in both
//! directions from local storage:
//!
//! - forward: etext id → all values of a predicate ([`MetadataCache::get_metadata`])
//! - reverse: (predicate, value) → all etext ids ([`MetadataCache::get_etexts`])
//!
//! Three interchangeable backends sit behind the [`store::MetadataStore`]
//! trait: an embedded ordered key-value store (the default), an embedded
//! SQLite database (the portability fallback), and a remote SPARQL
//! triple-store (opt-in). Backend choice never changes query results.
//!
//! ```no_run
//! use gutencache::{CacheConfig, CatalogDump, EtextId, MetadataCache, Predicate};
//!
//! # fn main() -> miette::Result<()> {
//! let cache = MetadataCache::open(CacheConfig::default_locations()?)?;
//! if !cache.is_populated()? {
//!     let dump = CatalogDump::open("rdf-files.tar.gz");
//!     cache.populate(&dump)?;
//! }
//! let id = EtextId::new(2701).expect("nonzero");
//! let titles = cache.get_metadata(Predicate::Title, id)?;
//! println!("{titles:?}");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod paths;
pub mod populate;
pub mod store;
pub mod text;
pub mod vocabulary;

pub use cache::MetadataCache;
pub use catalog::{CatalogDump, ParseStats};
pub use config::{BackendKind, CacheConfig, RemoteConfig};
pub use error::{GutenError, GutenResult};
pub use model::{CacheState, EtextId, Triple};
pub use populate::{CancelToken, DEFAULT_BATCH_SIZE, PopulateOptions};
pub use text::{MirrorTextSource, TextSource, strip_headers};
pub use vocabulary::Predicate;
