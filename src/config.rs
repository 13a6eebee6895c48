//! Backend selection and cache configuration.
//!
//! The configuration is an explicit, caller-scoped object passed to
//! [`crate::cache::MetadataCache::open`] — there is no implicit process
//! global, which keeps concurrent test runs (and embedders with several
//! caches) isolated. Selection happens once, before any population or query
//! call; switching backends afterwards never migrates data, since each
//! backend owns its own independent state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError};
use crate::paths::GutenPaths;
use crate::store::kv::KvStore;
use crate::store::relational::RelationalStore;
use crate::store::remote::RemoteStore;
use crate::store::{MetadataStore, StoreResult};

/// The storage technology backing the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Embedded ordered key-value store (redb). Fast, the default.
    EmbeddedKv,
    /// Embedded relational store (SQLite). Portable, slower fallback.
    EmbeddedRelational,
    /// Remote RDF triple-store reached over HTTP. Opt-in only.
    RemoteTriplestore,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::EmbeddedKv => "embedded_kv",
            BackendKind::EmbeddedRelational => "embedded_relational",
            BackendKind::RemoteTriplestore => "remote_triplestore",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedded_kv" => Ok(BackendKind::EmbeddedKv),
            "embedded_relational" => Ok(BackendKind::EmbeddedRelational),
            "remote_triplestore" => Ok(BackendKind::RemoteTriplestore),
            other => Err(ConfigError::UnknownBackend {
                name: other.to_string(),
            }),
        }
    }
}

/// Connection parameters for the remote triple-store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// SPARQL endpoint URL (query and update).
    pub endpoint: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout applied to every batch and query.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Idempotent retries on transient transport failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl RemoteConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Full cache configuration: which backend, and where its data lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: BackendKind,
    /// Directory owned by the embedded backends (also the lock-file anchor
    /// for the remote backend).
    pub storage_location: PathBuf,
    /// Remote connection parameters; absence disables the remote backend.
    pub remote: Option<RemoteConfig>,
}

impl CacheConfig {
    pub fn new(backend: BackendKind, storage_location: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            storage_location: storage_location.into(),
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.backend = BackendKind::RemoteTriplestore;
        self.remote = Some(remote);
        self
    }

    /// Select a backend for `location` by static priority: the embedded
    /// key-value engine if it can be opened there, otherwise the embedded
    /// relational store (with a logged warning). The remote backend is never
    /// chosen implicitly.
    ///
    /// This is a selection-time probe; once selected, no operation ever
    /// falls back to a different backend.
    pub fn detect(location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        match KvStore::open(&location) {
            Ok(_) => Self::new(BackendKind::EmbeddedKv, location),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "embedded key-value engine unavailable; falling back to the \
                     relational backend, performance may be degraded"
                );
                Self::new(BackendKind::EmbeddedRelational, location)
            }
        }
    }

    /// Default configuration at the XDG data directory.
    pub fn default_locations() -> Result<Self, ConfigError> {
        let paths = GutenPaths::resolve()?;
        Ok(Self::detect(paths.metadata_dir()))
    }

    /// Load configuration from a TOML file.
    ///
    /// Recognized keys: `backend`, `storage_location`, `remote_endpoint`,
    /// `remote_user`, `remote_password`, `remote_timeout_secs`,
    /// `remote_max_retries`. Missing keys fall back to the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let file: ConfigFile = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let storage_location = match file.storage_location {
            Some(loc) => loc,
            None => GutenPaths::resolve()?.metadata_dir(),
        };

        let remote = file.remote_endpoint.map(|endpoint| RemoteConfig {
            endpoint,
            user: file.remote_user,
            password: file.remote_password,
            timeout_secs: file.remote_timeout_secs.unwrap_or_else(default_timeout_secs),
            max_retries: file.remote_max_retries.unwrap_or_else(default_max_retries),
        });

        let backend = match file.backend {
            Some(name) => name.parse()?,
            None => {
                return Ok(match remote {
                    // Explicit connection parameters select the remote backend.
                    Some(remote) => Self::new(BackendKind::RemoteTriplestore, storage_location)
                        .with_remote(remote),
                    None => Self::detect(storage_location),
                });
            }
        };

        if backend == BackendKind::RemoteTriplestore && remote.is_none() {
            return Err(ConfigError::MissingRemoteEndpoint);
        }

        Ok(Self {
            backend,
            storage_location,
            remote,
        })
    }

    /// Open the configured backend.
    ///
    /// An unopenable backend is a hard [`StoreError::Unavailable`], never a
    /// silent substitution.
    pub fn open_store(&self) -> StoreResult<Box<dyn MetadataStore>> {
        match self.backend {
            BackendKind::EmbeddedKv => Ok(Box::new(KvStore::open(&self.storage_location)?)),
            BackendKind::EmbeddedRelational => {
                Ok(Box::new(RelationalStore::open(&self.storage_location)?))
            }
            BackendKind::RemoteTriplestore => {
                let remote = self.remote.as_ref().ok_or(StoreError::Unavailable {
                    backend: "remote_triplestore",
                    location: "(unset)".to_string(),
                    reason: "no remote endpoint configured".to_string(),
                })?;
                Ok(Box::new(RemoteStore::connect(remote)?))
            }
        }
    }

    /// Lock-file path guarding population of this cache.
    pub fn lock_path(&self) -> PathBuf {
        self.storage_location.join("populate.lock")
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    backend: Option<String>,
    storage_location: Option<PathBuf>,
    remote_endpoint: Option<String>,
    remote_user: Option<String>,
    remote_password: Option<String>,
    remote_timeout_secs: Option<u64>,
    remote_max_retries: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backend_names_roundtrip() {
        for kind in [
            BackendKind::EmbeddedKv,
            BackendKind::EmbeddedRelational,
            BackendKind::RemoteTriplestore,
        ] {
            assert_eq!(kind.name().parse::<BackendKind>().unwrap(), kind);
        }
        assert!(matches!(
            "bsddb".parse::<BackendKind>(),
            Err(ConfigError::UnknownBackend { .. })
        ));
    }

    #[test]
    fn detect_prefers_embedded_kv() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::detect(dir.path().join("metadata"));
        assert_eq!(config.backend, BackendKind::EmbeddedKv);
    }

    #[test]
    fn detect_falls_back_to_relational() {
        let dir = TempDir::new().unwrap();
        // A plain file where the storage directory should go blocks redb.
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"x").unwrap();
        let config = CacheConfig::detect(&blocked);
        assert_eq!(config.backend, BackendKind::EmbeddedRelational);
    }

    #[test]
    fn config_file_with_explicit_backend() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "backend = \"embedded_relational\"\nstorage_location = \"/tmp/guten\"\n",
        )
        .unwrap();
        let config = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config.backend, BackendKind::EmbeddedRelational);
        assert_eq!(config.storage_location, PathBuf::from("/tmp/guten"));
        assert!(config.remote.is_none());
    }

    #[test]
    fn remote_endpoint_selects_remote_backend() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "storage_location = \"/tmp/guten\"\n\
             remote_endpoint = \"http://triples.example/sparql\"\n\
             remote_user = \"melville\"\n",
        )
        .unwrap();
        let config = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config.backend, BackendKind::RemoteTriplestore);
        let remote = config.remote.unwrap();
        assert_eq!(remote.endpoint, "http://triples.example/sparql");
        assert_eq!(remote.user.as_deref(), Some("melville"));
        assert_eq!(remote.timeout_secs, 30);
    }

    #[test]
    fn remote_backend_without_endpoint_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend = \"remote_triplestore\"\n").unwrap();
        assert!(matches!(
            CacheConfig::from_file(&path),
            Err(ConfigError::MissingRemoteEndpoint)
        ));
    }

    #[test]
    fn open_store_never_substitutes_backends() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"x").unwrap();
        let config = CacheConfig::new(BackendKind::EmbeddedKv, &blocked);
        let err = config.open_store().unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { backend: "embedded_kv", .. }));
    }
}
