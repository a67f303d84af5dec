// src/services/exports.rs

//! Export navigator.
//!
//! Walks the report catalog and queues a server-side export for every
//! report. The run is all-or-nothing: the first failing step aborts it.

use std::time::Duration;

use crate::driver::PortalPage;
use crate::error::{AppError, Result};
use crate::models::{Catalog, Step, StepAction, export_steps};

/// Execute one catalog step: locate, wait until visible, act.
pub async fn run_step(page: &dyn PortalPage, step: &Step, timeout: Duration) -> Result<()> {
    let locator = step.locator();
    page.wait_visible(&locator, timeout).await?;
    match &step.action {
        StepAction::Click => page.click(&locator).await?,
        StepAction::Check => page.check(&locator).await?,
        StepAction::Select(option) => page.select_option(&locator, option).await?,
    }
    log::info!("{} → {}", step.action, step.description);
    Ok(())
}

/// Queues exports for every report of a catalog.
pub struct ExportNavigator {
    step_timeout: Duration,
}

impl ExportNavigator {
    pub fn new(step_timeout: Duration) -> Self {
        Self { step_timeout }
    }

    /// Queue an export for every file of every group, in catalog order.
    ///
    /// Failures come back as `Navigation` errors naming the group, file
    /// and step; a closed browser is returned unchanged.
    pub async fn queue_all_exports(&self, page: &dyn PortalPage, catalog: &Catalog) -> Result<()> {
        let mut last_phase = String::from("start");

        for group in &catalog.groups {
            for step in &group.navigation {
                let phase = format!("{} / {}", group.name, step.description);
                self.checked_step(page, step, &phase, &last_phase).await?;
                last_phase = phase;
            }

            for file in &group.files {
                for step in export_steps(file) {
                    let phase = format!("{} / {} / {}", group.name, file, step.description);
                    self.checked_step(page, &step, &phase, &last_phase).await?;
                    last_phase = phase;
                }
                log::info!("Export queued for {file}");
            }
        }

        log::info!("All {} exports queued", catalog.file_count());
        Ok(())
    }

    async fn checked_step(
        &self,
        page: &dyn PortalPage,
        step: &Step,
        phase: &str,
        last_phase: &str,
    ) -> Result<()> {
        match run_step(page, step, self.step_timeout).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::error!("Export navigation stopped at '{phase}' (last reached: {last_phase})");
                if e.is_session_closed() {
                    Err(e)
                } else {
                    Err(AppError::navigation(phase, e))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakePage;

    fn navigator() -> ExportNavigator {
        ExportNavigator::new(Duration::from_secs(15))
    }

    #[tokio::test]
    async fn test_queues_in_catalog_order() {
        let page = FakePage::new();
        let catalog = Catalog::standard();

        navigator().queue_all_exports(&page, &catalog).await.unwrap();

        let actions = page.actions();
        let tabs: Vec<&String> = actions
            .iter()
            .filter(|a| a.starts_with("click ul#report-nav-scroll"))
            .collect();
        assert_eq!(tabs.len(), 7);
        assert!(tabs[0].contains("Flat File - CD"));
        assert!(tabs[5].contains("Flat File - TSM NI/SI"));
        assert!(tabs[6].contains("Flat File - Chemist Warehouse"));

        let favorites = actions.iter().filter(|a| *a == "click #FavoritesLink").count();
        assert_eq!(favorites, 3);
        assert!(actions.contains(&"select div.iterate-select select = 1: Object".to_string()));
    }

    #[tokio::test]
    async fn test_missing_element_aborts_everything() {
        let page = FakePage::new();
        page.hide("ul#report-nav-scroll li.reportNavLi", Some("Flat File - PSNI"));

        let err = navigator()
            .queue_all_exports(&page, &Catalog::standard())
            .await
            .unwrap_err();

        match err {
            AppError::Navigation { step, .. } => {
                assert!(step.contains("Flat Files 2"));
                assert!(step.contains("Flat File - PSNI"));
            }
            other => panic!("expected Navigation, got {other:?}"),
        }
        let actions = page.actions();
        assert!(!actions.iter().any(|a| a.contains("TSM")));
        assert!(!actions.iter().any(|a| a.contains("Flat File - PSNI")));
    }

    #[tokio::test]
    async fn test_closed_browser_passes_through() {
        let page = FakePage::new();
        page.terminate();

        let err = navigator()
            .queue_all_exports(&page, &Catalog::standard())
            .await
            .unwrap_err();

        assert!(err.is_session_closed());
    }

    #[tokio::test]
    async fn test_run_step_dispatches_action() {
        let page = FakePage::new();
        let step = Step::check("ul li label.check-label span", "Pivot Table").with_text("Pivot Table");

        run_step(&page, &step, Duration::from_secs(1)).await.unwrap();

        assert_eq!(
            page.actions(),
            ["check ul li label.check-label span [text=\"Pivot Table\"]"]
        );
    }
}
