//! Persistence and filesystem side effects.
//!
//! - `files`: download folder naming, relocation and cleanup
//! - `settings`: the user's JSON settings file
//! - `credentials`: portal login stores (environment, OS keyring)

pub mod credentials;
pub mod files;
pub mod settings;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ScheduleEntry, Settings};

// Re-export for convenience
pub use credentials::{CredentialStore, EnvCredentials};
#[cfg(feature = "keyring")]
pub use credentials::KeyringStore;
pub use files::{
    CleanupReport, Move, canonical_file_name, cleanup_stale, cleanup_stale_on, ensure_dir,
    relocate, reserve_unique_path, sanitize_filename,
};
pub use settings::LocalSettings;

/// Trait for settings storage backends.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load settings; a missing store yields defaults.
    async fn load(&self) -> Result<Settings>;

    /// Replace the stored settings.
    async fn save(&self, settings: &Settings) -> Result<()>;

    /// Drop the given entries from the persisted schedule list.
    ///
    /// Returns how many entries were removed.
    async fn remove_schedules(&self, fired: &[ScheduleEntry]) -> Result<usize> {
        if fired.is_empty() {
            return Ok(0);
        }
        let mut settings = self.load().await?;
        let before = settings.schedules.len();
        settings.schedules.retain(|entry| !fired.contains(entry));
        let removed = before - settings.schedules.len();
        if removed > 0 {
            self.save(&settings).await?;
        }
        Ok(removed)
    }
}
