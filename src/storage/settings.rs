//! JSON settings file.
//!
//! ## Layout
//!
//! ```text
//! {root}/
//! └── settings.json   # downloadPath, destinationPath, excelPath, npdPath, schedules
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::Settings;
use crate::storage::SettingsStore;

const SETTINGS_FILE: &str = "settings.json";

/// Settings persisted as a single JSON document.
#[derive(Debug, Clone)]
pub struct LocalSettings {
    path: PathBuf,
}

impl LocalSettings {
    /// Store `settings.json` inside `root_dir`.
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            path: root_dir.as_ref().join(SETTINGS_FILE),
        }
    }

    /// Store settings at an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for LocalSettings {
    async fn load(&self) -> Result<Settings> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No settings at {}, using empty", self.path.display());
                Ok(Settings::default())
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(settings)?;
        self.write_bytes(&bytes).await?;
        log::debug!("Settings written to {}", self.path.display());
        Ok(())
    }
}
