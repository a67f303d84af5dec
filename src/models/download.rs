//! Download outcomes.

use std::path::PathBuf;

use serde::Serialize;

/// How one item's attempt sequence ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOutcome {
    Saved(PathBuf),
    Failed(String),
}

/// Result of all attempts for one notification item.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    /// Canonical report name
    pub file_name: String,

    /// Attempts actually made
    pub attempts: u32,

    pub outcome: DownloadOutcome,

    /// The last failure was the browser going away
    #[serde(skip)]
    pub session_closed: bool,
}

impl DownloadResult {
    pub fn saved(file_name: impl Into<String>, path: PathBuf, attempts: u32) -> Self {
        Self {
            file_name: file_name.into(),
            attempts,
            outcome: DownloadOutcome::Saved(path),
            session_closed: false,
        }
    }

    pub fn failed(file_name: impl Into<String>, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            file_name: file_name.into(),
            attempts,
            outcome: DownloadOutcome::Failed(error.into()),
            session_closed: false,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DownloadOutcome::Saved(_))
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match &self.outcome {
            DownloadOutcome::Saved(path) => Some(path),
            DownloadOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            DownloadOutcome::Saved(_) => None,
            DownloadOutcome::Failed(message) => Some(message),
        }
    }
}

/// Batch summary of a download run.
#[derive(Debug, Default, Serialize)]
pub struct DownloadSummary {
    pub successes: Vec<DownloadResult>,
    pub failures: Vec<DownloadResult>,
}

impl DownloadSummary {
    /// Partition per-item results.
    pub fn from_results(results: impl IntoIterator<Item = DownloadResult>) -> Self {
        let (successes, failures) = results.into_iter().partition(DownloadResult::is_success);
        Self {
            successes,
            failures,
        }
    }

    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// Whether any item failed because the browser was closed.
    pub fn session_closed(&self) -> bool {
        self.failures.iter().any(|f| f.session_closed)
    }
}
