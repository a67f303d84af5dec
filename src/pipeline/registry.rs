// src/pipeline/registry.rs

//! Active workflow run bookkeeping.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::WorkflowKind;

/// A registered run.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub id: Uuid,
    pub kind: WorkflowKind,
    pub started_at: DateTime<Local>,
    pub cancel: CancellationToken,
}

/// Allows a single workflow run at a time against the shared folders.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<Option<ActiveRun>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a run, refusing while another one is active.
    pub fn begin(&self, kind: WorkflowKind) -> Result<RunGuard> {
        let mut slot = self.slot();
        if let Some(run) = slot.as_ref() {
            return Err(AppError::Busy(format!(
                "{} run {} started {}",
                run.kind,
                run.id,
                run.started_at.format("%H:%M:%S")
            )));
        }

        let run = ActiveRun {
            id: Uuid::new_v4(),
            kind,
            started_at: Local::now(),
            cancel: CancellationToken::new(),
        };
        ::log::info!("Run {} ({}) registered", run.id, run.kind);
        *slot = Some(run.clone());

        Ok(RunGuard {
            registry: self.clone(),
            run,
        })
    }

    pub fn active(&self) -> Option<ActiveRun> {
        self.slot().clone()
    }

    /// Cancel the active run, if any.
    pub fn cancel_active(&self) -> bool {
        match self.slot().as_ref() {
            Some(run) => {
                ::log::info!("Cancelling run {} ({})", run.id, run.kind);
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Keeps a run registered until dropped.
#[derive(Debug)]
pub struct RunGuard {
    registry: RunRegistry,
    run: ActiveRun,
}

impl RunGuard {
    pub fn id(&self) -> Uuid {
        self.run.id
    }

    pub fn kind(&self) -> WorkflowKind {
        self.run.kind
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.run.cancel
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut slot = self.registry.slot();
        if slot.as_ref().is_some_and(|run| run.id == self.run.id) {
            *slot = None;
        }
    }
}
