// src/pipeline/download.rs

//! Download pipeline: login, poll, download, relocate, clean up.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::driver::PortalPage;
use crate::error::{AppError, Result};
use crate::models::{Config, Credentials, DownloadSummary, PortalSelectors, TargetFileSet};
use crate::services::{DownloadOrchestrator, NotificationPoller, PortalSession};
use crate::storage::{self, CleanupReport, Move};
use crate::utils::{cancellable, log};

/// What a download run did.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub summary: DownloadSummary,
    pub moved: Vec<Move>,
    pub cleanup: CleanupReport,
}

/// Fetch the finished exports and move them into `destination_dir`.
///
/// Partial download failures are reported, not raised. A closed browser
/// fails the run with `SessionClosed`; `cancel` firing at any point fails
/// it with `Cancelled`.
pub async fn run_download(
    config: &Config,
    page: &dyn PortalPage,
    credentials: &Credentials,
    download_dir: &Path,
    destination_dir: &Path,
    cancel: &CancellationToken,
) -> Result<DownloadReport> {
    log::header("Downloading finished exports");
    let selectors = PortalSelectors::default();
    let targets = TargetFileSet::standard();

    log::step(1, 5, "Preparing folders");
    storage::ensure_dir(download_dir).await?;
    storage::ensure_dir(destination_dir).await?;

    log::step(2, 5, "Logging in");
    let session = PortalSession::new(config.portal.clone(), selectors.clone());
    cancellable(cancel, session.establish_session(page, credentials)).await?;

    log::step(3, 5, "Reading notifications");
    let poller = NotificationPoller::new(
        selectors,
        config.navigation.step_timeout(),
        config.notifications.render_timeout(),
    );
    let items = cancellable(
        cancel,
        poller.poll_latest(page, &targets, config.notifications.max_items),
    )
    .await?;

    log::step(4, 5, &format!("Downloading {} file(s)", items.len()));
    let summary = DownloadOrchestrator::new(config.downloads.clone(), cancel.clone())
        .download_all(page, &items, download_dir)
        .await;
    log::sub_item(&format!(
        "Downloads finished. Success: {}, Failures: {}",
        summary.successes.len(),
        summary.failures.len()
    ));
    for failure in &summary.failures {
        log::warn(&format!(
            "{} failed after {} attempt(s): {}",
            failure.file_name,
            failure.attempts,
            failure.error().unwrap_or_default()
        ));
    }

    if summary.session_closed() {
        return Err(AppError::SessionClosed);
    }
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }

    log::step(5, 5, "Moving files and cleaning up");
    let moved = storage::relocate(
        download_dir,
        destination_dir,
        targets.names(),
        &config.downloads.extension,
    )
    .await?;
    let cleanup = storage::cleanup_stale(download_dir).await?;

    log::summary(
        "Download run",
        &[
            ("Downloaded", summary.successes.len().to_string()),
            ("Failed", summary.failures.len().to_string()),
            ("Moved", moved.len().to_string()),
            ("Temporary files removed", cleanup.removed.to_string()),
        ],
    );

    Ok(DownloadReport {
        summary,
        moved,
        cleanup,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::driver::fake::{FakeAttempt, FakePage, FakeRow};

    fn creds() -> Credentials {
        Credentials {
            username: "u".into(),
            password: "p".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_downloads_and_relocates() {
        let download = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        let page = FakePage::new();
        page.set_rows(vec![
            FakeRow::new("Flat File - CD", "10:00"),
            FakeRow::new("Something else", "10:01"),
            FakeRow::new("Flat File - TSM NI/SI", "10:02"),
        ]);
        page.script_downloads("Flat File - CD", vec![FakeAttempt::Fail("blip".into())]);
        std::fs::write(
            download.path().join(format!("{}.xlsx", uuid::Uuid::new_v4())),
            b"tmp",
        )
        .unwrap();

        let report = run_download(
            &Config::default(),
            &page,
            &creds(),
            download.path(),
            destination.path(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.summary.successes.len(), 2);
        assert_eq!(report.moved.len(), 2);
        assert_eq!(report.cleanup.removed, 1);
        assert!(destination.path().join("Flat File - CD.xlsx").exists());
        assert!(destination.path().join("Flat File - TSM NI_SI.xlsx").exists());
        assert_eq!(std::fs::read_dir(download.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_feed_still_succeeds() {
        let download = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        let page = FakePage::new();

        let report = run_download(
            &Config::default(),
            &page,
            &creds(),
            &download.path().join("new"),
            &destination.path().join("new"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.summary.total(), 0);
        assert!(download.path().join("new").is_dir());
        assert!(destination.path().join("new").is_dir());
    }

    #[tokio::test]
    async fn test_closed_browser_during_downloads() {
        let download = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        let page = FakePage::new();
        page.set_rows(vec![FakeRow::new("Flat File - CD", "10:00")]);
        page.script_downloads("Flat File - CD", vec![FakeAttempt::Closed]);

        let err = run_download(
            &Config::default(),
            &page,
            &creds(),
            download.path(),
            destination.path(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is_session_closed());
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_login() {
        let download = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        let page = FakePage::new();
        page.set_rows(vec![FakeRow::new("Flat File - CD", "10:00")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_download(
            &Config::default(),
            &page,
            &creds(),
            download.path(),
            destination.path(),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Cancelled));
        assert!(page.actions().is_empty());
        assert!(!destination.path().join("Flat File - CD.xlsx").exists());
    }
}
