// src/models/mod.rs

//! Domain models for the export automation.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod catalog;
mod config;
mod download;
mod notification;
mod schedule;
mod selectors;
mod settings;

// Re-export all public types
pub use catalog::{Catalog, ReportGroup, Step, StepAction, TARGET_FILES, TargetFileSet, export_steps};
pub use config::{
    BrowserConfig, Config, DownloadConfig, LoggingConfig, NavigationConfig, NotificationConfig,
    PortalConfig, ProcessorConfig, WorkflowConfig,
};
pub use download::{DownloadOutcome, DownloadResult, DownloadSummary};
pub use notification::NotificationItem;
pub use schedule::{ScheduleEntry, WorkflowKind, parse_local};
pub use selectors::PortalSelectors;
pub use settings::Settings;

/// Login credentials for the portal.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
