//! Service layer for the export automation.
//!
//! This module contains the portal-facing logic for:
//! - Login (`PortalSession`)
//! - Export queuing (`ExportNavigator`)
//! - Notification polling (`NotificationPoller`)
//! - Concurrent downloads (`DownloadOrchestrator`)
//! - External spreadsheet processors (`ExternalTask`, `Processors`)

mod downloads;
mod exports;
mod notifications;
pub mod processors;
mod session;

pub use downloads::DownloadOrchestrator;
pub use exports::{ExportNavigator, run_step};
pub use notifications::NotificationPoller;
pub use processors::{ExternalTask, Processors, TaskHandle, TaskState};
pub use session::PortalSession;
