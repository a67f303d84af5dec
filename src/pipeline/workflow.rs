// src/pipeline/workflow.rs

//! Workflow runner: the entry point shared by the CLI commands and the
//! schedule watcher.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::driver::{Launcher, PortalPage};
use crate::error::{AppError, Result};
use crate::models::{Config, Credentials, Settings, WorkflowKind};
use crate::pipeline::download::{DownloadReport, run_download};
use crate::pipeline::export::run_export;
use crate::pipeline::registry::{RunGuard, RunRegistry};
use crate::pipeline::schedule::Dispatcher;
use crate::services::Processors;
use crate::storage::{CredentialStore, SettingsStore};
use crate::utils::{self, cancellable, log};

/// Process-level outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// The user closed the browser
    SessionClosed,
    Failed,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::SessionClosed => 2,
            Self::Failed => 1,
        }
    }

    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) if e.exit_code() == 2 => Self::SessionClosed,
            Err(_) => Self::Failed,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::SessionClosed => "User closed browser",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

fn log_run_exit(joined: std::result::Result<ExitStatus, tokio::task::JoinError>) {
    match joined {
        Ok(status) => ::log::debug!("Scheduled run exited: {status}"),
        Err(e) => log::warn(&format!("Scheduled run aborted: {e}")),
    }
}

async fn close_quietly(page: &dyn PortalPage) {
    if let Err(e) = page.close().await {
        ::log::debug!("Closing browser: {e}");
    }
}

/// Runs workflows with the shared config, browser and stores.
#[derive(Clone)]
pub struct WorkflowRunner {
    config: Arc<Config>,
    launcher: Arc<dyn Launcher>,
    settings: Arc<dyn SettingsStore>,
    credentials: Arc<dyn CredentialStore>,
    registry: RunRegistry,
}

impl WorkflowRunner {
    pub fn new(
        config: Arc<Config>,
        launcher: Arc<dyn Launcher>,
        settings: Arc<dyn SettingsStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            config,
            launcher,
            settings,
            credentials,
            registry: RunRegistry::new(),
        }
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    fn processors(&self) -> Processors {
        Processors::new(self.config.processors.clone())
    }

    /// Run a workflow kind end to end and report its exit status.
    pub async fn run(&self, kind: WorkflowKind) -> ExitStatus {
        match self.registry.begin(kind) {
            Ok(guard) => self.run_registered(guard).await,
            Err(e) => {
                log::error(&format!("{kind} workflow refused: {e}"));
                ExitStatus::Failed
            }
        }
    }

    async fn run_registered(&self, guard: RunGuard) -> ExitStatus {
        let kind = guard.kind();
        let result = self.run_kind(kind, guard.cancel_token().clone()).await;
        let status = ExitStatus::from_result(&result);
        match &result {
            Ok(()) => log::success(&format!("{kind} workflow finished")),
            Err(e) => log::error(&format!("{kind} workflow ended ({status}): {e}")),
        }
        status
    }

    async fn run_kind(&self, kind: WorkflowKind, cancel: CancellationToken) -> Result<()> {
        let settings = self.settings.load().await?;

        if kind.runs_dashboard() {
            let credentials = self.credentials.require().await?;
            self.dashboard(&settings, &credentials, cancel.clone()).await?;
        }
        if kind.runs_pivot() {
            self.pivot(&settings, cancel).await?;
        }
        Ok(())
    }

    /// Export, wait for the portal to build the files, then download.
    async fn dashboard(
        &self,
        settings: &Settings,
        credentials: &Credentials,
        cancel: CancellationToken,
    ) -> Result<()> {
        let (download_dir, destination_dir) = settings.transfer_paths()?;

        self.export_with(credentials, &download_dir, cancel.clone())
            .await?;

        let settle = Duration::from_secs(self.config.workflow.export_settle_secs);
        log::sub_item(&format!(
            "Waiting {} for exports to complete",
            utils::format_duration(settle)
        ));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            _ = tokio::time::sleep(settle) => {}
        }

        self.download_with(credentials, &download_dir, &destination_dir, cancel)
            .await?;
        Ok(())
    }

    async fn pivot(&self, settings: &Settings, cancel: CancellationToken) -> Result<()> {
        let workbook = settings
            .excel_path
            .as_deref()
            .ok_or_else(|| AppError::config("excelPath is not set"))?;
        let task = self.processors().pivot(workbook)?;
        let name = task.name().to_string();
        task.spawn(cancel)?.wait(&name).await
    }

    /// Queue the exports without downloading.
    pub async fn export(&self) -> Result<()> {
        let guard = self.registry.begin(WorkflowKind::Dashboard)?;
        let settings = self.settings.load().await?;
        let credentials = self.credentials.require().await?;
        let download_dir = settings
            .download_path
            .unwrap_or_else(|| PathBuf::from("."));
        self.export_with(&credentials, &download_dir, guard.cancel_token().clone())
            .await
    }

    /// Download only, optionally overriding the stored folders.
    pub async fn download(
        &self,
        download_dir: Option<PathBuf>,
        destination_dir: Option<PathBuf>,
    ) -> Result<DownloadReport> {
        let guard = self.registry.begin(WorkflowKind::Dashboard)?;
        let settings = self.settings.load().await?;
        let credentials = self.credentials.require().await?;

        let paths = Settings {
            download_path: download_dir.or(settings.download_path),
            destination_path: destination_dir.or(settings.destination_path),
            ..Settings::default()
        };
        let (download_dir, destination_dir) = paths.transfer_paths()?;
        self.download_with(
            &credentials,
            &download_dir,
            &destination_dir,
            guard.cancel_token().clone(),
        )
        .await
    }

    /// NPD refresh over the stored workbook.
    pub async fn npd(&self) -> Result<()> {
        let guard = self.registry.begin(WorkflowKind::Pivot)?;
        let settings = self.settings.load().await?;
        let workbook = settings
            .npd_path
            .as_deref()
            .ok_or_else(|| AppError::config("npdPath is not set"))?;
        let task = self.processors().npd(workbook)?;
        let name = task.name().to_string();
        task.spawn(guard.cancel_token().clone())?.wait(&name).await
    }

    /// Launch, log in and queue the exports. The browser is closed on
    /// every outcome, cancellation included.
    async fn export_with(
        &self,
        credentials: &Credentials,
        download_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<()> {
        let page = self.launcher.launch(download_dir).await?;
        let result = cancellable(
            &cancel,
            run_export(&self.config, page.as_ref(), credentials),
        )
        .await;
        close_quietly(page.as_ref()).await;
        result
    }

    async fn download_with(
        &self,
        credentials: &Credentials,
        download_dir: &Path,
        destination_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<DownloadReport> {
        let page = self.launcher.launch(download_dir).await?;
        let result = run_download(
            &self.config,
            page.as_ref(),
            credentials,
            download_dir,
            destination_dir,
            &cancel,
        )
        .await;
        close_quietly(page.as_ref()).await;

        let report = result?;
        self.date_update(destination_dir, cancel).await;
        Ok(report)
    }

    /// Stamp the refreshed files; failures are logged only.
    async fn date_update(&self, destination_dir: &Path, cancel: CancellationToken) {
        let processors = self.processors();
        if !processors.has_date_update() {
            ::log::debug!("No date update processor configured");
            return;
        }
        let outcome = async move {
            let task = processors.date_update(destination_dir)?;
            let name = task.name().to_string();
            task.spawn(cancel)?.wait(&name).await
        }
        .await;
        if let Err(e) = outcome {
            log::warn(&format!("Date update failed: {e}"));
        }
    }

    /// Run scheduled workflows until `cancel` fires.
    ///
    /// A schedule firing while a run is active is skipped. On return the
    /// active run has been cancelled and awaited.
    pub async fn watch(&self, cancel: CancellationToken) -> Result<()> {
        log::header("Watching schedules");
        let (sender, mut receiver) = mpsc::channel(8);
        let interval = Duration::from_secs(self.config.workflow.schedule_interval_secs);
        let dispatcher = Dispatcher::new(Arc::clone(&self.settings), interval);
        let ticker = tokio::spawn(dispatcher.run(sender, cancel.clone()));
        let mut runs = JoinSet::new();

        loop {
            let kind = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = runs.join_next(), if !runs.is_empty() => {
                    log_run_exit(joined);
                    continue;
                }
                next = receiver.recv() => match next {
                    Some(kind) => kind,
                    None => break,
                },
            };

            match self.registry.begin(kind) {
                Ok(guard) => {
                    let runner = self.clone();
                    runs.spawn(async move { runner.run_registered(guard).await });
                }
                Err(e) => log::warn(&format!("Skipping scheduled {kind} run: {e}")),
            }
        }

        if self.registry.cancel_active() {
            ::log::info!("Waiting for the active run to stop");
        }
        while let Some(joined) = runs.join_next().await {
            log_run_exit(joined);
        }
        ticker
            .await
            .map_err(|e| AppError::Schedule(format!("dispatcher stopped: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::driver::fake::{FakeLauncher, FakePage, FakeRow};
    use crate::models::ScheduleEntry;
    use crate::storage::LocalSettings;

    struct StaticCredentials;

    #[async_trait]
    impl CredentialStore for StaticCredentials {
        async fn get(&self) -> Result<Option<Credentials>> {
            Ok(Some(Credentials {
                username: "u".into(),
                password: "p".into(),
            }))
        }

        async fn save(&self, _credentials: &Credentials) -> Result<()> {
            Ok(())
        }

        async fn delete(&self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "static"
        }
    }

    struct Fixture {
        tmp: TempDir,
        launcher: Arc<FakeLauncher>,
        runner: WorkflowRunner,
    }

    async fn fixture(page: FakePage, config: Config, with_paths: bool) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalSettings::new(tmp.path()));
        if with_paths {
            store
                .save(&Settings {
                    download_path: Some(tmp.path().join("downloads")),
                    destination_path: Some(tmp.path().join("flat")),
                    excel_path: Some(tmp.path().join("pivot.sh")),
                    ..Settings::default()
                })
                .await
                .unwrap();
        }
        let launcher = Arc::new(FakeLauncher::new(page));
        let runner = WorkflowRunner::new(
            Arc::new(config),
            launcher.clone(),
            store,
            Arc::new(StaticCredentials),
        );
        Fixture {
            tmp,
            launcher,
            runner,
        }
    }

    fn quick_config() -> Config {
        let mut config = Config::default();
        config.workflow.export_settle_secs = 0;
        config
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::from_result(&Ok(())).code(), 0);
        assert_eq!(
            ExitStatus::from_result::<()>(&Err(AppError::SessionClosed)),
            ExitStatus::SessionClosed
        );
        assert_eq!(
            ExitStatus::from_result::<()>(&Err(AppError::Cancelled)).code(),
            1
        );
    }

    #[tokio::test]
    async fn test_dashboard_run() {
        let page = FakePage::new();
        page.set_rows(vec![FakeRow::new("Flat File - CD", "10:00")]);
        let fx = fixture(page, quick_config(), true).await;

        let status = fx.runner.run(WorkflowKind::Dashboard).await;

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(fx.launcher.launches(), 2);
        assert!(fx.tmp.path().join("flat").join("Flat File - CD.xlsx").exists());
        assert!(fx.runner.registry().active().is_none());
    }

    #[tokio::test]
    async fn test_closed_browser_exit_status() {
        let page = FakePage::new();
        page.terminate();
        let fx = fixture(page, quick_config(), true).await;

        let status = fx.runner.run(WorkflowKind::Dashboard).await;

        assert_eq!(status, ExitStatus::SessionClosed);
        assert_eq!(status.code(), 2);
    }

    #[tokio::test]
    async fn test_missing_paths_fail() {
        let fx = fixture(FakePage::new(), quick_config(), false).await;

        assert_eq!(fx.runner.run(WorkflowKind::Dashboard).await, ExitStatus::Failed);
        assert_eq!(fx.launcher.launches(), 0);
    }

    #[tokio::test]
    async fn test_busy_registry_refuses() {
        let fx = fixture(FakePage::new(), quick_config(), true).await;
        let _active = fx.runner.registry().begin(WorkflowKind::Pivot).unwrap();

        assert_eq!(fx.runner.run(WorkflowKind::Dashboard).await, ExitStatus::Failed);
        assert!(matches!(fx.runner.export().await, Err(AppError::Busy(_))));
        assert_eq!(fx.launcher.launches(), 0);
    }

    #[tokio::test]
    async fn test_pivot_requires_processor() {
        let fx = fixture(FakePage::new(), quick_config(), true).await;
        assert_eq!(fx.runner.run(WorkflowKind::Pivot).await, ExitStatus::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pivot_runs_processor() {
        let mut config = quick_config();
        config.processors.pivot = Some(PathBuf::from("sh"));
        let fx = fixture(FakePage::new(), config, true).await;
        std::fs::write(fx.tmp.path().join("pivot.sh"), "echo refreshed\nexit 0\n").unwrap();

        assert_eq!(fx.runner.run(WorkflowKind::Pivot).await, ExitStatus::Success);
        assert_eq!(fx.launcher.launches(), 0);
    }

    #[tokio::test]
    async fn test_download_overrides_paths() {
        let page = FakePage::new();
        page.set_rows(vec![FakeRow::new("Flat File - NWNI", "10:00")]);
        let fx = fixture(page, quick_config(), false).await;
        let destination = fx.tmp.path().join("elsewhere");

        let report = fx
            .runner
            .download(Some(fx.tmp.path().join("dl")), Some(destination.clone()))
            .await
            .unwrap();

        assert_eq!(report.moved.len(), 1);
        assert!(destination.join("Flat File - NWNI.xlsx").exists());
    }

    #[tokio::test]
    async fn test_cancelled_export_closes_browser() {
        let fx = fixture(FakePage::new(), quick_config(), true).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let credentials = StaticCredentials.require().await.unwrap();

        let err = fx
            .runner
            .export_with(&credentials, fx.tmp.path(), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Cancelled));
        assert_eq!(fx.launcher.page.actions(), ["close"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_watch_runs_schedule_and_stops_it_on_cancel() {
        let mut config = quick_config();
        config.processors.pivot = Some(PathBuf::from("sh"));
        let fx = fixture(FakePage::new(), config, true).await;
        std::fs::write(fx.tmp.path().join("pivot.sh"), "sleep 30\n").unwrap();

        let store = LocalSettings::new(fx.tmp.path());
        let mut settings = store.load().await.unwrap();
        settings.schedules.push(ScheduleEntry {
            date: chrono::Local::now().naive_local(),
            repeat: false,
            kind: WorkflowKind::Pivot,
        });
        store.save(&settings).await.unwrap();

        let cancel = CancellationToken::new();
        let runner = fx.runner.clone();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move { runner.watch(cancel).await }
        });

        tokio::time::timeout(Duration::from_secs(10), async {
            while fx.runner.registry().active().is_none() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(10), watcher)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(fx.runner.registry().active().is_none());
        assert!(store.load().await.unwrap().schedules.is_empty());
    }
}
