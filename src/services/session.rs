// src/services/session.rs

//! Portal login.

use crate::driver::{Locator, PortalPage};
use crate::error::{AppError, Result};
use crate::models::{Credentials, PortalConfig, PortalSelectors};

/// Logs a page into the portal.
pub struct PortalSession {
    config: PortalConfig,
    selectors: PortalSelectors,
}

impl PortalSession {
    pub fn new(config: PortalConfig, selectors: PortalSelectors) -> Self {
        Self { config, selectors }
    }

    /// Run the login sequence until the landing page shows up.
    ///
    /// Every failure restarts the whole sequence, up to
    /// `login_attempts` times. A closed browser is returned immediately.
    pub async fn establish_session(
        &self,
        page: &dyn PortalPage,
        credentials: &Credentials,
    ) -> Result<()> {
        let attempts = self.config.login_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            log::info!("Login attempt {attempt}/{attempts}");
            match self.attempt(page, credentials).await {
                Ok(()) => {
                    log::info!("Logged in as {}", credentials.username);
                    return Ok(());
                }
                Err(e) if e.is_session_closed() => return Err(e),
                Err(e) => {
                    log::warn!("Login attempt {attempt} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(AppError::Auth {
            attempts,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    async fn attempt(&self, page: &dyn PortalPage, credentials: &Credentials) -> Result<()> {
        page.goto(&self.config.login_url, self.config.navigation_timeout())
            .await?;

        let username = Locator::new(&self.selectors.username_input);
        let password = Locator::new(&self.selectors.password_input);
        page.wait_visible(&username, self.config.field_timeout())
            .await?;
        page.wait_visible(&password, self.config.field_timeout())
            .await?;

        page.fill(&username, &credentials.username).await?;
        page.fill(&password, &credentials.password).await?;
        page.click(&Locator::new(&self.selectors.login_button))
            .await?;

        page.wait_for_url(&self.config.landing_url, self.config.login_timeout())
            .await
    }
}
