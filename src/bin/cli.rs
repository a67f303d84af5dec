//! Unify export CLI
//!
//! Local execution entry point: on-demand workflows, the schedule
//! watcher and settings management.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use unify_export::{
    config::{StoragePaths, load_config, validate_all},
    driver::chromium::ChromiumLauncher,
    error::{AppError, Result},
    models::{Config, Credentials, ScheduleEntry, WorkflowKind, parse_local},
    pipeline::{ExitStatus, WorkflowRunner},
    storage::{self, CredentialStore, SettingsStore},
    utils::log,
};

/// Unify portal export automation
#[derive(Parser, Debug)]
#[command(
    name = "unify-export",
    version,
    about = "Queues Unify exports and collects the flat files"
)]
struct Cli {
    /// Path to storage directory containing config and settings
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and queue every catalog export
    Export,

    /// Download finished exports and move them into place
    Download {
        /// Browser download folder (default: stored downloadPath)
        #[arg(long)]
        download_dir: Option<PathBuf>,

        /// Folder for the canonical files (default: stored destinationPath)
        #[arg(long)]
        destination_dir: Option<PathBuf>,
    },

    /// Run a workflow as the scheduler would
    Run {
        #[arg(long, value_enum)]
        kind: WorkflowKind,
    },

    /// Refresh the NPD workbook
    Npd,

    /// Run scheduled workflows until interrupted
    Watch,

    /// Manage scheduled runs
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Show or change stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Manage the portal login
    Credentials {
        #[command(subcommand)]
        action: CredentialsAction,
    },

    /// Delete today's leftover download artifacts from a folder
    Cleanup { dir: PathBuf },

    /// Validate configuration and catalog
    Validate,
}

#[derive(Subcommand, Debug)]
enum ScheduleAction {
    /// Add a schedule entry
    Add {
        /// Local time, e.g. "2026-10-20 06:00"
        #[arg(long)]
        at: String,

        #[arg(long, value_enum)]
        kind: WorkflowKind,

        /// Repeat weekly on the same weekday and time
        #[arg(long)]
        repeat: bool,
    },

    /// List schedule entries
    List,

    /// Remove every schedule entry
    Clear,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the stored settings
    Show,

    /// Update stored paths; omitted values are kept
    Set {
        #[arg(long)]
        download_path: Option<PathBuf>,

        #[arg(long)]
        destination_path: Option<PathBuf>,

        #[arg(long)]
        excel_path: Option<PathBuf>,

        #[arg(long)]
        npd_path: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum CredentialsAction {
    /// Store the portal login
    Set {
        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,
    },

    /// Forget the portal login
    Clear,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn credential_store() -> Arc<dyn CredentialStore> {
    #[cfg(feature = "keyring")]
    {
        Arc::new(storage::KeyringStore::default())
    }
    #[cfg(not(feature = "keyring"))]
    {
        Arc::new(storage::EnvCredentials)
    }
}

/// Cancel the active run (and `cancel`, if given) on Ctrl-C.
fn cancel_on_interrupt(runner: &WorkflowRunner, cancel: Option<CancellationToken>) {
    let registry = runner.registry().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::warn!("Interrupted, cancelling");
            registry.cancel_active();
            if let Some(cancel) = cancel {
                cancel.cancel();
            }
        }
    });
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let paths = StoragePaths::new(&cli.storage_dir);

    let loaded = load_config(&paths.config);
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".into());
    init_logging(cli.verbose, &level);

    let config = loaded.unwrap_or_else(|e| {
        ::log::warn!(
            "Config load failed from {}: {e}. Using defaults.",
            paths.config.display()
        );
        Config::default()
    });

    let status = match execute(cli.command, config, &paths).await {
        Ok(status) => status,
        Err(e) => {
            log::error(&e.to_string());
            ExitStatus::from_result::<()>(&Err(e))
        }
    };
    std::process::exit(status.code());
}

async fn execute(command: Command, config: Config, paths: &StoragePaths) -> Result<ExitStatus> {
    let settings: Arc<dyn SettingsStore> = Arc::new(paths.settings_store());
    let credentials = credential_store();
    let launcher = Arc::new(ChromiumLauncher::new(config.browser.clone()));
    let runner = WorkflowRunner::new(
        Arc::new(config.clone()),
        launcher,
        Arc::clone(&settings),
        Arc::clone(&credentials),
    );

    match command {
        Command::Export => {
            cancel_on_interrupt(&runner, None);
            runner.export().await?;
        }

        Command::Download {
            download_dir,
            destination_dir,
        } => {
            cancel_on_interrupt(&runner, None);
            let report = runner.download(download_dir, destination_dir).await?;
            if !report.summary.failures.is_empty() {
                log::warn(&format!(
                    "{} of {} download(s) failed",
                    report.summary.failures.len(),
                    report.summary.total()
                ));
            }
        }

        Command::Run { kind } => {
            cancel_on_interrupt(&runner, None);
            return Ok(runner.run(kind).await);
        }

        Command::Npd => {
            cancel_on_interrupt(&runner, None);
            runner.npd().await?;
        }

        Command::Watch => {
            let cancel = CancellationToken::new();
            cancel_on_interrupt(&runner, Some(cancel.clone()));
            runner.watch(cancel).await?;
        }

        Command::Schedule { action } => schedule(action, settings.as_ref(), credentials.as_ref()).await?,

        Command::Settings { action } => match action {
            SettingsAction::Show => {
                let current = settings.load().await?;
                println!("{}", serde_json::to_string_pretty(&current)?);
            }
            SettingsAction::Set {
                download_path,
                destination_path,
                excel_path,
                npd_path,
            } => {
                let mut current = settings.load().await?;
                current.download_path = download_path.or(current.download_path);
                current.destination_path = destination_path.or(current.destination_path);
                current.excel_path = excel_path.or(current.excel_path);
                current.npd_path = npd_path.or(current.npd_path);
                settings.save(&current).await?;
                log::success("Settings saved");
            }
        },

        Command::Credentials { action } => match action {
            CredentialsAction::Set { username, password } => {
                credentials
                    .save(&Credentials { username, password })
                    .await?;
                log::success(&format!("Credentials saved to {}", credentials.name()));
            }
            CredentialsAction::Clear => {
                credentials.delete().await?;
                log::success(&format!("Credentials removed from {}", credentials.name()));
            }
        },

        Command::Cleanup { dir } => {
            let report = storage::cleanup_stale(&dir).await?;
            log::summary(
                "Cleanup",
                &[
                    ("Removed", report.removed.to_string()),
                    ("Skipped", report.skipped.to_string()),
                ],
            );
        }

        Command::Validate => {
            ::log::info!("Validating configuration...");
            validate_all(&config)?;
            ::log::info!("All validations passed!");
        }
    }

    Ok(ExitStatus::Success)
}

async fn schedule(
    action: ScheduleAction,
    settings: &dyn SettingsStore,
    credentials: &dyn CredentialStore,
) -> Result<()> {
    let mut current = settings.load().await?;
    match action {
        ScheduleAction::Add { at, kind, repeat } => {
            current.check_schedulable()?;
            if credentials.get().await?.is_none() {
                return Err(AppError::Schedule(format!(
                    "store credentials in {} before scheduling",
                    credentials.name()
                )));
            }

            let entry = ScheduleEntry {
                date: parse_local(&at)?,
                repeat,
                kind,
            };
            log::success(&format!("Scheduled {entry}"));
            current.schedules.push(entry);
            settings.save(&current).await?;
        }
        ScheduleAction::List => {
            if current.schedules.is_empty() {
                ::log::info!("No schedules");
            }
            for (index, entry) in current.schedules.iter().enumerate() {
                println!("{:>2}. {entry}", index + 1);
            }
        }
        ScheduleAction::Clear => {
            let count = current.schedules.len();
            current.schedules.clear();
            settings.save(&current).await?;
            log::success(&format!("Removed {count} schedule(s)"));
        }
    }
    Ok(())
}
