// src/services/processors.rs

//! External spreadsheet processors.
//!
//! Each executable runs as an [`ExternalTask`] whose progress is published
//! through a `watch` channel. The processors report the spreadsheet host
//! they start with a `Excel started with PID:<n>` line; that helper is
//! killed together with the child on cancellation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::ProcessorConfig;

/// Output line emitted over and over by the processors; never useful.
const NOISE: &str = "The RPC server is unavailable.";

/// Failure lines the processors print when their host is killed under them.
const CANCEL_ERRORS: [&str; 4] = [
    "Pivot refreshing failed:",
    "Date filter update failed:",
    "Power BI Pivots failed:",
    "Critical error",
];

/// Lifecycle of an external task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Starting,
    Running { pid: Option<u32> },
    Completed(i32),
    Failed(String),
    Cancelled,
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Completed(_) | Self::Failed(_) | Self::Cancelled
        )
    }
}

pub fn is_noise(line: &str) -> bool {
    line.contains(NOISE)
}

/// Whether a line is an expected complaint after a cancel.
pub fn suppressed_after_cancel(line: &str) -> bool {
    CANCEL_ERRORS.iter().any(|marker| line.contains(marker))
}

/// Helper process id announced on a processor output line.
pub fn parse_helper_pid(line: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"Excel started with PID:\s*(\d+)").expect("PID pattern is valid")
    });
    pattern
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// An executable invocation.
#[derive(Debug, Clone)]
pub struct ExternalTask {
    name: String,
    program: PathBuf,
    args: Vec<OsString>,
}

impl ExternalTask {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the process; `cancel` kills it and its helper.
    pub fn spawn(self, cancel: CancellationToken) -> Result<TaskHandle> {
        let (state_tx, state_rx) = watch::channel(TaskState::Starting);
        let helper_pid = Arc::new(AtomicU32::new(0));

        log::info!("Starting {} ({})", self.name, self.program.display());
        let mut child = match Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to start process: {e}");
                state_tx.send_replace(TaskState::Failed(message.clone()));
                return Err(AppError::process(&self.name, message));
            }
        };

        state_tx.send_replace(TaskState::Running { pid: child.id() });

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(
                stdout,
                self.name.clone(),
                false,
                Arc::clone(&helper_pid),
                cancel.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(
                stderr,
                self.name.clone(),
                true,
                Arc::clone(&helper_pid),
                cancel.clone(),
            )));
        }

        let join = tokio::spawn(supervise(
            self.name,
            child,
            readers,
            Arc::clone(&helper_pid),
            cancel,
            state_tx,
        ));

        Ok(TaskHandle {
            state: state_rx,
            helper_pid,
            join,
        })
    }
}

/// A running external task.
pub struct TaskHandle {
    state: watch::Receiver<TaskState>,
    helper_pid: Arc<AtomicU32>,
    join: JoinHandle<TaskState>,
}

impl TaskHandle {
    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.state.clone()
    }

    /// Helper process announced by the child so far.
    pub fn helper_pid(&self) -> Option<u32> {
        match self.helper_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Wait for the final state.
    pub async fn finish(self) -> TaskState {
        match self.join.await {
            Ok(state) => state,
            Err(e) => TaskState::Failed(format!("supervisor stopped: {e}")),
        }
    }

    /// Wait for the task and turn anything but exit code 0 into an error.
    pub async fn wait(self, name: &str) -> Result<()> {
        match self.finish().await {
            TaskState::Completed(0) => Ok(()),
            TaskState::Completed(code) => Err(AppError::process(
                name,
                format!("failed with code {code}"),
            )),
            TaskState::Failed(message) => Err(AppError::process(name, message)),
            TaskState::Cancelled => Err(AppError::Cancelled),
            TaskState::Starting | TaskState::Running { .. } => {
                Err(AppError::process(name, "ended without a final state"))
            }
        }
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(
    stream: R,
    name: String,
    is_stderr: bool,
    helper_pid: Arc<AtomicU32>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::debug!("[{name}] output closed: {e}");
                break;
            }
        };

        if let Some(pid) = parse_helper_pid(&line) {
            helper_pid.store(pid, Ordering::SeqCst);
            log::debug!("[{name}] helper pid {pid}");
        }
        if line.trim().is_empty() || is_noise(&line) {
            continue;
        }
        if cancel.is_cancelled() && suppressed_after_cancel(&line) {
            continue;
        }

        if is_stderr {
            log::error!("[{name}] {line}");
        } else {
            log::info!("[{name}] {line}");
        }
    }
}

async fn supervise(
    name: String,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    helper_pid: Arc<AtomicU32>,
    cancel: CancellationToken,
    state_tx: watch::Sender<TaskState>,
) -> TaskState {
    let final_state = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                for reader in readers {
                    if let Err(e) = reader.await {
                        log::debug!("[{name}] output reader stopped: {e}");
                    }
                }
                let code = status.code().unwrap_or(-1);
                if code == 0 {
                    log::info!("{name} finished successfully");
                } else if !cancel.is_cancelled() {
                    log::error!("{name} failed with code {code}");
                }
                TaskState::Completed(code)
            }
            Err(e) => TaskState::Failed(e.to_string()),
        },
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                log::warn!("Couldn't stop {name}: {e}");
            }
            let pid = helper_pid.load(Ordering::SeqCst);
            if pid != 0 {
                kill_helper(pid).await;
            }
            for reader in readers {
                reader.abort();
            }
            log::info!("{name} stopped");
            TaskState::Cancelled
        }
    };

    state_tx.send_replace(final_state.clone());
    final_state
}

/// Force-kill a process tree by id.
async fn kill_helper(pid: u32) {
    let mut command = if cfg!(windows) {
        let mut c = Command::new("taskkill");
        c.args(["/PID", &pid.to_string(), "/F", "/T"]);
        c
    } else {
        let mut c = Command::new("kill");
        c.args(["-9", &pid.to_string()]);
        c
    };
    match command.stdout(Stdio::null()).stderr(Stdio::null()).status().await {
        Ok(status) if status.success() => log::info!("Killed helper process {pid}"),
        Ok(status) => log::warn!("Killing helper process {pid} exited with {status}"),
        Err(e) => log::warn!("Couldn't kill helper process {pid}: {e}"),
    }
}

/// Builds the configured processor invocations.
#[derive(Debug, Clone)]
pub struct Processors {
    config: ProcessorConfig,
}

impl Processors {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    fn program(configured: &Option<PathBuf>, key: &str) -> Result<PathBuf> {
        configured
            .clone()
            .ok_or_else(|| AppError::config(format!("processors.{key} is not configured")))
    }

    /// Pivot refresh over the user's workbook.
    pub fn pivot(&self, workbook: &Path) -> Result<ExternalTask> {
        Ok(ExternalTask::new("Pivot refresh", Self::program(&self.config.pivot, "pivot")?)
            .arg(workbook))
    }

    /// NPD refresh over its workbook.
    pub fn npd(&self, workbook: &Path) -> Result<ExternalTask> {
        Ok(ExternalTask::new("NPD refresh", Self::program(&self.config.npd, "npd")?).arg(workbook))
    }

    /// Date stamp update over the destination folder.
    pub fn date_update(&self, destination: &Path) -> Result<ExternalTask> {
        Ok(ExternalTask::new(
            "Date update",
            Self::program(&self.config.date_update, "date_update")?,
        )
        .arg(destination))
    }

    pub fn has_date_update(&self) -> bool {
        self.config.date_update.is_some()
    }
}
