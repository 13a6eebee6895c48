//! Rich diagnostic error types for gutencache.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.
//!
//! Two outcomes are deliberately *not* errors: an unknown entity id and a
//! reverse lookup with no match both return empty sets, since "absent" is a
//! normal result of exact-match lookup.

use miette::Diagnostic;
use thiserror::Error;

use crate::model::CacheState;

/// Top-level error type for gutencache.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum GutenError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Populate(#[from] PopulateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Text(#[from] TextError),
}

// ---------------------------------------------------------------------------
// Catalog errors
// ---------------------------------------------------------------------------

/// Fatal catalog-dump failures.
///
/// Individual malformed records are never errors: the parser skips and counts
/// them in [`crate::catalog::ParseStats`].
#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("cannot read catalog dump: {source}")]
    #[diagnostic(
        code(gutencache::catalog::io),
        help(
            "Check that the dump file exists, is readable, and was downloaded \
             completely. A truncated archive fails here rather than mid-stream."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("catalog archive is not readable as tar: {message}")]
    #[diagnostic(
        code(gutencache::catalog::archive),
        help(
            "The catalog dump must be a tar archive of per-work RDF records, \
             optionally gzip-compressed. Re-download the dump if it is corrupt."
        )
    )]
    Archive { message: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Backend-internal failures, one taxonomy across all three backends so
/// callers stay backend-agnostic.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("{backend} backend unavailable at {location}: {reason}")]
    #[diagnostic(
        code(gutencache::store::unavailable),
        help(
            "The configured backend could not be opened or reached. gutencache \
             never substitutes another backend silently; fix the location or \
             pick a different backend explicitly."
        )
    )]
    Unavailable {
        backend: &'static str,
        location: String,
        reason: String,
    },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(gutencache::store::io),
        help(
            "A filesystem operation failed. Check that the storage location \
             exists, has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(gutencache::store::kv),
        help(
            "The embedded key-value store encountered a transaction error. \
             This may indicate corruption; try clearing and re-populating the cache."
        )
    )]
    Kv { message: String },

    #[error("sqlite error: {message}")]
    #[diagnostic(
        code(gutencache::store::sqlite),
        help(
            "The embedded relational store encountered an error. \
             This may indicate corruption; try clearing and re-populating the cache."
        )
    )]
    Sqlite { message: String },

    #[error("remote triple-store error: {message}")]
    #[diagnostic(
        code(gutencache::store::remote),
        help(
            "A SPARQL request to the remote triple-store failed. Check the \
             endpoint URL, credentials, and network reachability. Transient \
             failures during population are retried automatically."
        )
    )]
    Remote { message: String },

    #[error("corrupt cache state: {message}")]
    #[diagnostic(
        code(gutencache::store::corrupt),
        help(
            "The persisted cache-state marker could not be interpreted. The \
             cache was probably written by an incompatible version; clear it \
             and re-populate."
        )
    )]
    Corrupt { message: String },
}

// ---------------------------------------------------------------------------
// Population errors
// ---------------------------------------------------------------------------

/// Errors from the one-shot bulk population run.
///
/// Any of `Store`, `Catalog`, or `Cancelled` leaves the cache in the `Failed`
/// state; recovery is re-running `populate()` from scratch, never a resume.
#[derive(Debug, Error, Diagnostic)]
pub enum PopulateError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),

    #[error("population cancelled")]
    #[diagnostic(
        code(gutencache::populate::cancelled),
        help(
            "A cancellation signal stopped the run between batches. The cache \
             is marked failed; run populate again to rebuild it from scratch."
        )
    )]
    Cancelled,

    #[error("cache is already populated at {location}")]
    #[diagnostic(
        code(gutencache::populate::already_populated),
        help(
            "Population is a one-time, explicit operation. To rebuild the \
             cache, clear it first (or use refresh, which does both)."
        )
    )]
    AlreadyPopulated { location: String },

    #[error("another population run holds the lock at {lock_path}")]
    #[diagnostic(
        code(gutencache::populate::in_progress),
        help(
            "Concurrent population against the same backend is a correctness \
             hazard and is refused. Wait for the other run to finish, or \
             delete the lock file if it is stale."
        )
    )]
    InProgress { lock_path: String },

    #[error("cannot manage population lock at {path}: {source}")]
    #[diagnostic(
        code(gutencache::populate::lock_io),
        help("Check write permissions on the directory containing the storage location.")
    )]
    LockIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Query errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("metadata cache is not populated (state: {state})")]
    #[diagnostic(
        code(gutencache::query::not_populated),
        help(
            "Queries require a successful one-time population run, which can \
             take hours. Run `gutencache populate` first. This is surfaced as \
             a distinct error, not an empty result, so you can tell \"no data \
             for this id\" apart from \"the cache was never built\"."
        )
    )]
    NotPopulated { state: CacheState },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    #[diagnostic(
        code(gutencache::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {message}")]
    #[diagnostic(
        code(gutencache::config::parse),
        help("The config file must be valid TOML. See the README for the recognized keys.")
    )]
    Parse { path: String, message: String },

    #[error("unknown backend \"{name}\"")]
    #[diagnostic(
        code(gutencache::config::unknown_backend),
        help("Valid backends are: embedded_kv, embedded_relational, remote_triplestore.")
    )]
    UnknownBackend { name: String },

    #[error("remote_triplestore backend selected but no remote endpoint configured")]
    #[diagnostic(
        code(gutencache::config::missing_endpoint),
        help(
            "The remote backend needs connection parameters. Set remote_endpoint \
             (and optionally remote_user / remote_password) in the config."
        )
    )]
    MissingRemoteEndpoint,

    #[error("cannot determine home directory")]
    #[diagnostic(
        code(gutencache::config::no_home),
        help("Set the HOME environment variable or pass an explicit storage location.")
    )]
    NoHome,
}

// ---------------------------------------------------------------------------
// Text acquisition errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TextError {
    #[error("no download location found for etext {etext} on {mirror}")]
    #[diagnostic(
        code(gutencache::text::unknown_download_uri),
        help(
            "None of the known file-name variants exist for this etext on the \
             configured mirror. Try a different mirror \
             (https://www.gutenberg.org/MIRRORS.ALL)."
        )
    )]
    UnknownDownloadUri { etext: u64, mirror: String },

    #[error("fetch failed: {message}")]
    #[diagnostic(
        code(gutencache::text::fetch),
        help("Check network reachability and the mirror URL.")
    )]
    Fetch { message: String },
}

/// Convenience alias for functions returning gutencache results.
pub type GutenResult<T> = std::result::Result<T, GutenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_to_guten_error() {
        let err = StoreError::Kv {
            message: "boom".into(),
        };
        let top: GutenError = err.into();
        assert!(matches!(top, GutenError::Store(StoreError::Kv { .. })));
    }

    #[test]
    fn populate_error_wraps_store_error() {
        let store_err = StoreError::Io {
            source: std::io::Error::other("disk gone"),
        };
        let pop: PopulateError = store_err.into();
        assert!(matches!(pop, PopulateError::Store(StoreError::Io { .. })));
    }

    #[test]
    fn not_populated_names_the_state() {
        let err = QueryError::NotPopulated {
            state: CacheState::Failed,
        };
        let msg = format!("{err}");
        assert!(msg.contains("failed"), "{msg}");
    }

    #[test]
    fn unavailable_names_backend_and_location() {
        let err = StoreError::Unavailable {
            backend: "embedded_kv",
            location: "/tmp/cache".into(),
            reason: "permission denied".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("embedded_kv"));
        assert!(msg.contains("/tmp/cache"));
    }
}
