// src/pipeline/export.rs

//! Export queuing pipeline.

use chrono::Local;

use crate::driver::PortalPage;
use crate::error::Result;
use crate::models::{Catalog, Config, Credentials, PortalSelectors, TargetFileSet};
use crate::services::{ExportNavigator, PortalSession};
use crate::utils::{self, log};

/// Log in and queue a server-side export for every catalog report.
pub async fn run_export(config: &Config, page: &dyn PortalPage, credentials: &Credentials) -> Result<()> {
    let start_time = Local::now();
    log::header("Queuing report exports");

    let catalog = Catalog::standard();
    catalog.validate(&TargetFileSet::standard())?;

    log::step(1, 2, "Logging in");
    PortalSession::new(config.portal.clone(), PortalSelectors::default())
        .establish_session(page, credentials)
        .await?;

    log::step(2, 2, &format!("Queuing {} exports", catalog.file_count()));
    ExportNavigator::new(config.navigation.step_timeout())
        .queue_all_exports(page, &catalog)
        .await?;

    let elapsed = (Local::now() - start_time).to_std().unwrap_or_default();
    log::success("All exports queued");
    log::sub_item(&format!("Elapsed: {}", utils::format_duration(elapsed)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakePage;

    fn creds() -> Credentials {
        Credentials {
            username: "u".into(),
            password: "p".into(),
        }
    }

    #[tokio::test]
    async fn test_login_precedes_navigation() {
        let page = FakePage::new();

        run_export(&Config::default(), &page, &creds()).await.unwrap();

        let actions = page.actions();
        let login = actions.iter().position(|a| a == "click #login").unwrap();
        let favorites = actions
            .iter()
            .position(|a| a == "click #FavoritesLink")
            .unwrap();
        assert!(login < favorites);
    }

    #[tokio::test]
    async fn test_login_failure_skips_navigation() {
        let page = FakePage::new();
        page.hide("#userID", None);

        assert!(run_export(&Config::default(), &page, &creds()).await.is_err());
        assert!(!page.actions().iter().any(|a| a.contains("#FavoritesLink")));
    }
}
