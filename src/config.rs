// src/config.rs

//! Configuration loading utilities.
//!
//! This module provides convenience functions for locating and loading
//! the tool configuration and the user settings under a storage
//! directory.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{Catalog, Config, TargetFileSet};
use crate::storage::LocalSettings;
use crate::utils::log;

/// Files kept under the storage directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub root: PathBuf,
    pub config: PathBuf,
    pub settings: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config: root.join("config.toml"),
            settings: root.join("settings.json"),
            root,
        }
    }

    pub fn settings_store(&self) -> LocalSettings {
        LocalSettings::at(&self.settings)
    }
}

/// Load configuration from a TOML file.
///
/// A missing file yields the defaults; a malformed one is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        ::log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    Config::load(path)
}

/// Check the configuration and the built-in catalog.
pub fn validate_all(config: &Config) -> Result<()> {
    config.validate()?;
    log::success("Config OK");

    let targets = TargetFileSet::standard();
    let catalog = Catalog::standard();
    catalog.validate(&targets)?;
    log::success(&format!(
        "Catalog OK ({} groups, {} files)",
        catalog.groups.len(),
        catalog.file_count()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_storage_layout() {
        let paths = StoragePaths::new("storage");
        assert_eq!(paths.config, PathBuf::from("storage/config.toml"));
        assert_eq!(paths.settings_store().path(), Path::new("storage/settings.json"));
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.downloads.max_concurrent, 7);
        assert!(validate_all(&config).is_ok());
    }

    #[test]
    fn test_partial_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[downloads]\nretries = 4\n").unwrap();

        let config = load_config(&path).unwrap();

        assert_eq!(config.downloads.retries, 4);
        assert_eq!(config.downloads.backoff_ms, 2000);
    }

    #[test]
    fn test_malformed_config_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[downloads\nretries = ").unwrap();

        assert!(load_config(&path).is_err());
    }
}
