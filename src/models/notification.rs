//! Notification feed entry.

use crate::driver::Locator;

/// One matching row of the notification feed at poll time.
///
/// The handle is only meaningful for the page state it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationItem {
    /// Canonical report name
    pub file_name: String,

    /// Timestamp as shown by the portal
    pub time: String,

    /// Element whose click starts the download
    pub handle: Locator,
}

impl NotificationItem {
    /// Format the item for display using a template.
    ///
    /// Supported placeholders: `{file}`, `{time}`
    pub fn format(&self, template: &str) -> String {
        template
            .replace("{file}", &self.file_name)
            .replace("{time}", &self.time)
    }
}
