// src/services/downloads.rs

//! Download orchestrator.
//!
//! Every notification item is downloaded independently with its own retry
//! loop; at most `max_concurrent` items are in flight at once.

use std::path::{Path, PathBuf};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::driver::PortalPage;
use crate::error::{AppError, Result};
use crate::models::{DownloadConfig, DownloadResult, DownloadSummary, NotificationItem};
use crate::storage::{canonical_file_name, ensure_dir, reserve_unique_path};

/// Downloads notification items into a folder.
pub struct DownloadOrchestrator {
    config: DownloadConfig,
    cancel: CancellationToken,
}

impl DownloadOrchestrator {
    /// `cancel` aborts pending attempts and backoff waits of this run.
    pub fn new(config: DownloadConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Download every item, never failing as a whole.
    pub async fn download_all(
        &self,
        page: &dyn PortalPage,
        items: &[NotificationItem],
        download_dir: &Path,
    ) -> DownloadSummary {
        if items.is_empty() {
            return DownloadSummary::default();
        }

        let concurrency = self.config.max_concurrent.max(1);
        log::info!(
            "Downloading {} file(s), up to {} at a time",
            items.len(),
            concurrency
        );

        let jobs: Vec<BoxFuture<'_, DownloadResult>> = items
            .iter()
            .map(|item| self.download_one(page, item, download_dir).boxed())
            .collect();
        let results: Vec<DownloadResult> = stream::iter(jobs)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        DownloadSummary::from_results(results)
    }

    async fn download_one(
        &self,
        page: &dyn PortalPage,
        item: &NotificationItem,
        download_dir: &Path,
    ) -> DownloadResult {
        let attempts = self.config.retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(page, item, download_dir).await {
                Ok(path) => return DownloadResult::saved(&item.file_name, path, attempt),
                Err(e) => {
                    log::warn!(
                        "Download failed for {} (attempt {}/{}): {}",
                        item.file_name,
                        attempt,
                        attempts,
                        e
                    );
                    if e.is_session_closed() {
                        let mut result = DownloadResult::failed(&item.file_name, e.to_string(), attempt);
                        result.session_closed = true;
                        return result;
                    }
                    if matches!(e, AppError::Cancelled) {
                        return DownloadResult::failed(&item.file_name, e.to_string(), attempt);
                    }
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                let backoff = self.config.backoff() * attempt;
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        return DownloadResult::failed(
                            &item.file_name,
                            AppError::Cancelled.to_string(),
                            attempt,
                        );
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        DownloadResult::failed(&item.file_name, last_error, attempts)
    }

    /// One click, wait and save cycle.
    ///
    /// The click waits `begin_timeout` for the transfer to start; the
    /// transfer itself gets `timeout`.
    async fn attempt(
        &self,
        page: &dyn PortalPage,
        item: &NotificationItem,
        download_dir: &Path,
    ) -> Result<PathBuf> {
        let mut download = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
            started = page.click_for_download(&item.handle, self.config.begin_timeout()) => started?,
        };

        ensure_dir(download_dir).await?;
        let file_name = canonical_file_name(&item.file_name, &self.config.extension);
        let target = reserve_unique_path(download_dir, &file_name).await?;

        let transfer = self.config.timeout();
        let saved = match tokio::time::timeout(transfer, download.save_as(&target)).await {
            Ok(saved) => saved,
            Err(_) => Err(AppError::timeout(format!("transfer of {}", item.file_name), transfer)),
        };
        if let Err(e) = saved {
            if let Err(remove_err) = tokio::fs::remove_file(&target).await {
                log::debug!("Couldn't drop placeholder {}: {}", target.display(), remove_err);
            }
            return Err(e);
        }

        log::info!(
            "✔ Saved {}",
            target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        Ok(target)
    }
}
