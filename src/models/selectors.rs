// src/models/selectors.rs

//! CSS selectors for the portal's login form and notification feed.

use serde::{Deserialize, Serialize};

/// CSS selectors for the fixed parts of the portal UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSelectors {
    /// Username input on the login page
    pub username_input: String,

    /// Password input on the login page
    pub password_input: String,

    /// Login submit button
    pub login_button: String,

    /// Bell icon opening the notification panel
    pub notification_bell: String,

    /// "View All" link expanding the panel to the full list
    pub notification_expand: String,

    /// Rows of the virtualized notification list
    pub notification_row: String,

    /// Title element within a row
    pub notification_title: String,

    /// Attribute preferred over visible text for the title
    pub title_attr: String,

    /// Timestamp cell within a row (first match)
    pub notification_time: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            username_input: "#userID".to_string(),
            password_input: "#password".to_string(),
            login_button: "#login".to_string(),
            notification_bell: "a.fa-bell".to_string(),
            notification_expand: "a.fa-expand span".to_string(),
            notification_row: "div.cdk-virtual-scroll-content-wrapper div.row".to_string(),
            notification_title: "div.title span.ellipsis".to_string(),
            title_attr: "title".to_string(),
            notification_time: "div.col-2".to_string(),
        }
    }
}
