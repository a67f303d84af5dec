// src/services/notifications.rs

//! Notification feed poller.

use std::time::Duration;

use crate::driver::{Locator, PortalPage};
use crate::error::{AppError, Result};
use crate::models::{NotificationItem, PortalSelectors, Step, TargetFileSet};
use crate::services::run_step;

/// Reads finished exports from the portal notification panel.
pub struct NotificationPoller {
    selectors: PortalSelectors,
    /// Visibility timeout for the bell and "View All"
    step_timeout: Duration,
    render_timeout: Duration,
}

impl NotificationPoller {
    pub fn new(selectors: PortalSelectors, step_timeout: Duration, render_timeout: Duration) -> Self {
        Self {
            selectors,
            step_timeout,
            render_timeout,
        }
    }

    /// Open the panel and collect the first `max_count` rows whose title
    /// is in `allowlist`, in feed order.
    ///
    /// An empty feed (no rows rendered in time) yields an empty list.
    pub async fn poll_latest(
        &self,
        page: &dyn PortalPage,
        allowlist: &TargetFileSet,
        max_count: usize,
    ) -> Result<Vec<NotificationItem>> {
        let bell = Step::click(&self.selectors.notification_bell, "Notification bell");
        let view_all = Step::click(&self.selectors.notification_expand, "View All").with_text("View All");
        run_step(page, &bell, self.step_timeout).await?;
        run_step(page, &view_all, self.step_timeout).await?;

        let rows = Locator::new(&self.selectors.notification_row);
        match page.wait_visible(&rows, self.render_timeout).await {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                log::info!("No notifications rendered");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }

        let total = page.count(&rows).await?;
        log::debug!("Notification rows: {total}");

        let mut items = Vec::new();
        for index in 0..total {
            if items.len() >= max_count {
                break;
            }
            match self.read_row(page, &rows, index, allowlist).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(e) if e.is_session_closed() => return Err(e),
                Err(e) => log::warn!("{e}"),
            }
        }

        if items.is_empty() {
            log::info!("No matching notifications found");
        } else {
            log::info!("Will download:");
            for item in &items {
                log::info!("{}", item.format("  {file}, {time}"));
            }
        }
        Ok(items)
    }

    /// Read one row; `None` when its title is not in the allowlist.
    async fn read_row(
        &self,
        page: &dyn PortalPage,
        rows: &Locator,
        index: usize,
        allowlist: &TargetFileSet,
    ) -> Result<Option<NotificationItem>> {
        let row = rows.clone().nth(index);
        let title = row.within(&self.selectors.notification_title);

        let raw = match page
            .attribute(&title, &self.selectors.title_attr)
            .await
            .map_err(|e| row_error(index, e))?
        {
            Some(value) if !value.trim().is_empty() => value,
            _ => page
                .inner_text(&title)
                .await
                .map_err(|e| row_error(index, e))?,
        };

        let file_name = raw.trim();
        if !allowlist.contains(file_name) {
            return Ok(None);
        }

        let time = page
            .inner_text(&row.within(&self.selectors.notification_time).nth(0))
            .await
            .map_err(|e| row_error(index, e))?;

        Ok(Some(NotificationItem {
            file_name: file_name.to_string(),
            time: time.trim().to_string(),
            handle: title,
        }))
    }
}

fn row_error(index: usize, error: AppError) -> AppError {
    if error.is_session_closed() {
        return error;
    }
    AppError::RowParse {
        index,
        message: error.to_string(),
    }
}
