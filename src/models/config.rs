//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Portal addresses and login timing
    #[serde(default)]
    pub portal: PortalConfig,

    /// Browser launch settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Export navigation settings
    #[serde(default)]
    pub navigation: NavigationConfig,

    /// Notification feed settings
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Download retry and concurrency settings
    #[serde(default)]
    pub downloads: DownloadConfig,

    /// Workflow timing
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// External spreadsheet processors
    #[serde(default)]
    pub processors: ProcessorConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.portal.login_url)?;
        Url::parse(&self.portal.landing_url)?;
        if self.portal.login_attempts == 0 {
            return Err(AppError::validation("portal.login_attempts must be > 0"));
        }
        if self.portal.navigation_timeout_secs == 0
            || self.portal.field_timeout_secs == 0
            || self.portal.login_timeout_secs == 0
        {
            return Err(AppError::validation("portal timeouts must be > 0"));
        }
        if self.navigation.step_timeout_secs == 0 {
            return Err(AppError::validation(
                "navigation.step_timeout_secs must be > 0",
            ));
        }
        if self.notifications.max_items == 0 {
            return Err(AppError::validation("notifications.max_items must be > 0"));
        }
        if self.downloads.max_concurrent == 0 {
            return Err(AppError::validation(
                "downloads.max_concurrent must be > 0",
            ));
        }
        if self.downloads.timeout_secs == 0 || self.downloads.begin_timeout_secs == 0 {
            return Err(AppError::validation("download timeouts must be > 0"));
        }
        if self.downloads.extension.trim().is_empty() {
            return Err(AppError::validation("downloads.extension is empty"));
        }
        if self.workflow.schedule_interval_secs == 0 {
            return Err(AppError::validation(
                "workflow.schedule_interval_secs must be > 0",
            ));
        }
        Ok(())
    }
}

/// Portal addresses and login timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Login page
    #[serde(default = "defaults::login_url")]
    pub login_url: String,

    /// Page the portal redirects to once authenticated
    #[serde(default = "defaults::landing_url")]
    pub landing_url: String,

    /// DOM-ready timeout for the login page
    #[serde(default = "defaults::navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Timeout for the credential inputs to render
    #[serde(default = "defaults::field_timeout")]
    pub field_timeout_secs: u64,

    /// Timeout for the post-login redirect (server side, slow)
    #[serde(default = "defaults::login_timeout")]
    pub login_timeout_secs: u64,

    /// Total login attempts
    #[serde(default = "defaults::login_attempts")]
    pub login_attempts: u32,
}

impl PortalConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn field_timeout(&self) -> Duration {
        Duration::from_secs(self.field_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: defaults::login_url(),
            landing_url: defaults::landing_url(),
            navigation_timeout_secs: defaults::navigation_timeout(),
            field_timeout_secs: defaults::field_timeout(),
            login_timeout_secs: defaults::login_timeout(),
            login_attempts: defaults::login_attempts(),
        }
    }
}

/// Browser launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Explicit Chrome / Edge executable; searched for when absent
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Persistent profile directory
    #[serde(default = "defaults::user_data_dir")]
    pub user_data_dir: PathBuf,

    /// Run without a window
    #[serde(default)]
    pub headless: bool,

    /// Extra command line switches
    #[serde(default = "defaults::browser_args")]
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            user_data_dir: defaults::user_data_dir(),
            headless: false,
            args: defaults::browser_args(),
        }
    }
}

/// Export navigation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Visibility timeout for every catalog step
    #[serde(default = "defaults::step_timeout")]
    pub step_timeout_secs: u64,
}

impl NavigationConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: defaults::step_timeout(),
        }
    }
}

/// Notification feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Most recent matching notifications to take
    #[serde(default = "defaults::max_items")]
    pub max_items: usize,

    /// Timeout for the first feed row to render
    #[serde(default = "defaults::render_timeout")]
    pub render_timeout_secs: u64,
}

impl NotificationConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_items: defaults::max_items(),
            render_timeout_secs: defaults::render_timeout(),
        }
    }
}

/// Download retry and concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Retries after the first attempt
    #[serde(default = "defaults::retries")]
    pub retries: u32,

    /// Linear backoff unit; attempt `n` waits `n * backoff_ms`
    #[serde(default = "defaults::backoff")]
    pub backoff_ms: u64,

    /// Timeout for a started transfer to finish
    #[serde(default = "defaults::download_timeout")]
    pub timeout_secs: u64,

    /// Window for a click to start its download
    #[serde(default = "defaults::begin_timeout")]
    pub begin_timeout_secs: u64,

    /// Downloads in flight at once
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Extension given to saved files
    #[serde(default = "defaults::extension")]
    pub extension: String,
}

impl DownloadConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn begin_timeout(&self) -> Duration {
        Duration::from_secs(self.begin_timeout_secs)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retries: defaults::retries(),
            backoff_ms: defaults::backoff(),
            timeout_secs: defaults::download_timeout(),
            begin_timeout_secs: defaults::begin_timeout(),
            max_concurrent: defaults::max_concurrent(),
            extension: defaults::extension(),
        }
    }
}

/// Workflow timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Wait between queuing exports and collecting them
    #[serde(default = "defaults::export_settle")]
    pub export_settle_secs: u64,

    /// Schedule polling period
    #[serde(default = "defaults::schedule_interval")]
    pub schedule_interval_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            export_settle_secs: defaults::export_settle(),
            schedule_interval_secs: defaults::schedule_interval(),
        }
    }
}

/// External spreadsheet processors. Unset entries are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Pivot refresh executable, receives the workbook path
    #[serde(default)]
    pub pivot: Option<PathBuf>,

    /// NPD refresh executable, receives the workbook path
    #[serde(default)]
    pub npd: Option<PathBuf>,

    /// Date update executable, receives the destination folder
    #[serde(default)]
    pub date_update: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Portal defaults
    pub fn login_url() -> String {
        "https://unify.ap.iriworldwide.com/client1/index.html".into()
    }
    pub fn landing_url() -> String {
        "https://unify.ap.iriworldwide.com/client1/plus/landing/0".into()
    }
    pub fn navigation_timeout() -> u64 {
        60
    }
    pub fn field_timeout() -> u64 {
        60
    }
    pub fn login_timeout() -> u64 {
        300
    }
    pub fn login_attempts() -> u32 {
        2
    }

    // Browser defaults
    pub fn user_data_dir() -> PathBuf {
        PathBuf::from("edge_profile")
    }
    pub fn browser_args() -> Vec<String> {
        vec!["--no-sandbox".into(), "--disable-setuid-sandbox".into()]
    }

    // Navigation defaults
    pub fn step_timeout() -> u64 {
        15
    }

    // Notification defaults
    pub fn max_items() -> usize {
        7
    }
    pub fn render_timeout() -> u64 {
        10
    }

    // Download defaults
    pub fn retries() -> u32 {
        2
    }
    pub fn backoff() -> u64 {
        2_000
    }
    pub fn download_timeout() -> u64 {
        600
    }
    pub fn begin_timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        7
    }
    pub fn extension() -> String {
        "xlsx".into()
    }

    // Workflow defaults
    pub fn export_settle() -> u64 {
        30 * 60
    }
    pub fn schedule_interval() -> u64 {
        30
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.downloads.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut config = Config::default();
        config.portal.landing_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(AppError::Url(_))));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [downloads]
            retries = 5

            [processors]
            pivot = "C:/tools/CircanaPivot.exe"
            "#,
        )
        .unwrap();
        assert_eq!(config.downloads.retries, 5);
        assert_eq!(config.downloads.backoff_ms, 2_000);
        assert_eq!(config.notifications.max_items, 7);
        assert_eq!(config.portal.login_attempts, 2);
        assert!(config.processors.pivot.is_some());
        assert!(config.processors.npd.is_none());
    }
}
