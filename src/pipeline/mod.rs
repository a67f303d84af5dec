//! Pipeline entry points for the export automation.
//!
//! - `run_export`: Log in and queue every catalog export
//! - `run_download`: Poll, download, relocate and clean up
//! - `WorkflowRunner`: Scheduled and on-demand workflow runs
//! - `Dispatcher`: Persisted schedule evaluation

pub mod download;
pub mod export;
pub mod registry;
pub mod schedule;
pub mod workflow;

pub use download::{DownloadReport, run_download};
pub use export::run_export;
pub use registry::{ActiveRun, RunGuard, RunRegistry};
pub use schedule::Dispatcher;
pub use workflow::{ExitStatus, WorkflowRunner};
