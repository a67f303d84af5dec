//! Browser action adapter.
//!
//! Everything above this module drives the portal through [`PortalPage`],
//! a small capability surface over a real automation driver. Elements are
//! addressed with [`Locator`] values, which are plain data so that the
//! catalog and tests can build them without a browser.
//!
//! - `chromium`: CDP implementation backed by `chromiumoxide`
//! - `fake`: scripted page used by the unit tests

#[cfg(feature = "chromium")]
pub mod chromium;
#[cfg(test)]
pub mod fake;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Declarative element address: CSS selector, optional text filter,
/// optional index among the matches, optional scoping parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub selector: String,

    /// Keep only matches whose text contains this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_text: Option<String>,

    /// Pick the n-th remaining match (first when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<usize>,

    /// Resolve `selector` inside the element addressed by the parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<Locator>>,
}

impl Locator {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            has_text: None,
            nth: None,
            parent: None,
        }
    }

    /// Restrict matches to elements containing `text`.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.has_text = Some(text.into());
        self
    }

    /// Address the n-th match (0-based).
    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }

    /// A locator for `selector` scoped to this element.
    pub fn within(&self, selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            has_text: None,
            nth: None,
            parent: Some(Box::new(self.clone())),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{parent} >> ")?;
        }
        write!(f, "{}", self.selector)?;
        if let Some(text) = &self.has_text {
            write!(f, " [text={text:?}]")?;
        }
        if let Some(index) = self.nth {
            write!(f, " [nth={index}]")?;
        }
        Ok(())
    }
}

/// Capability interface over one browser page.
///
/// Waits take an explicit timeout and fail with `AppError::Timeout`. Once
/// the browser is gone every call fails with `AppError::SessionClosed`.
/// A page is driven by one sequential caller, except for
/// [`PortalPage::click_for_download`] which may run concurrently.
#[async_trait]
pub trait PortalPage: Send + Sync {
    /// Navigate and wait for DOM readiness.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Wait until the current URL equals `url`.
    async fn wait_for_url(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Wait until the addressed element exists and is visible.
    async fn wait_visible(&self, locator: &Locator, timeout: Duration) -> Result<()>;

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()>;

    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Make sure a checkbox (or its label) ends up checked.
    async fn check(&self, locator: &Locator) -> Result<()>;

    /// Select the option of a `<select>` by value or label.
    async fn select_option(&self, locator: &Locator, option: &str) -> Result<()>;

    /// Number of elements the locator matches, ignoring `nth`.
    async fn count(&self, locator: &Locator) -> Result<usize>;

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>>;

    async fn inner_text(&self, locator: &Locator) -> Result<String>;

    /// Click the element and wait up to `timeout` for the download it
    /// starts. The transfer itself is awaited by [`Download::save_as`].
    async fn click_for_download(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Box<dyn Download>>;

    /// Shut the browser down; pages without a browser of their own do nothing.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens a fresh page whose downloads land in `download_dir`.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, download_dir: &Path) -> Result<Arc<dyn PortalPage>>;
}

/// A download started by the page.
#[async_trait]
pub trait Download: Send {
    /// File name proposed by the server, if any.
    fn suggested_filename(&self) -> Option<&str>;

    /// Wait for the transfer to finish and store it at `path`,
    /// replacing whatever is there.
    async fn save_as(&mut self, path: &Path) -> Result<()>;
}
