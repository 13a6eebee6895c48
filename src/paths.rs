//! XDG-compliant path resolution for gutencache.
//!
//! The cache can live anywhere; these are just the defaults used when the
//! caller does not pass an explicit storage location.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Global XDG-compliant directories for gutencache.
#[derive(Debug, Clone)]
pub struct GutenPaths {
    /// `$XDG_CONFIG_HOME/gutencache/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/gutencache/`
    pub data_dir: PathBuf,
    /// `$XDG_CACHE_HOME/gutencache/`
    pub cache_dir: PathBuf,
}

impl GutenPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> Result<Self, ConfigError> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("gutencache");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("gutencache");

        let cache_dir = std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".cache"))
            .join("gutencache");

        Ok(Self {
            config_dir,
            data_dir,
            cache_dir,
        })
    }

    /// Default storage location for the metadata cache.
    pub fn metadata_dir(&self) -> PathBuf {
        self.data_dir.join("metadata")
    }

    /// Default location of the gzipped full-text cache.
    pub fn text_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("text")
    }

    /// Path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Create all base directories. Idempotent.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.cache_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_hang_off_the_base_dirs() {
        let paths = GutenPaths {
            config_dir: PathBuf::from("/cfg/gutencache"),
            data_dir: PathBuf::from("/data/gutencache"),
            cache_dir: PathBuf::from("/cache/gutencache"),
        };
        assert_eq!(paths.metadata_dir(), PathBuf::from("/data/gutencache/metadata"));
        assert_eq!(paths.text_cache_dir(), PathBuf::from("/cache/gutencache/text"));
        assert_eq!(paths.config_file(), PathBuf::from("/cfg/gutencache/config.toml"));
    }

    #[test]
    fn resolve_appends_crate_dir() {
        let paths = GutenPaths::resolve().unwrap();
        assert!(paths.config_dir.to_string_lossy().contains("gutencache"));
        assert!(paths.data_dir.to_string_lossy().contains("gutencache"));
    }
}
