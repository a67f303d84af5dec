// src/pipeline/schedule.rs

//! Schedule dispatcher.
//!
//! Checks the persisted schedule on a fixed interval and emits the
//! workflow kind of every due entry. One-shot entries are deleted once
//! fired; repeating entries fire at most once per matching minute.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{ScheduleEntry, WorkflowKind};
use crate::storage::SettingsStore;

/// Fires workflow kinds for due schedule entries.
pub struct Dispatcher {
    store: Arc<dyn SettingsStore>,
    interval: Duration,
    /// Minute in which each repeating entry last fired
    fired: HashMap<ScheduleEntry, NaiveDateTime>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn SettingsStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            fired: HashMap::new(),
        }
    }

    /// Evaluate the schedule at `now` and return the kinds to run.
    pub async fn tick(&mut self, now: NaiveDateTime) -> Result<Vec<WorkflowKind>> {
        let settings = self.store.load().await?;
        let minute = truncate_to_minute(now);

        let mut kinds = Vec::new();
        let mut one_shots = Vec::new();
        for entry in settings.schedules.iter().filter(|e| e.matches(now)) {
            if entry.repeat {
                if self.fired.get(entry) == Some(&minute) {
                    continue;
                }
                self.fired.insert(entry.clone(), minute);
            } else {
                one_shots.push(entry.clone());
            }
            ::log::info!("Schedule fired: {entry}");
            kinds.push(entry.kind);
        }

        self.fired.retain(|_, fired_at| *fired_at == minute);

        let removed = self.store.remove_schedules(&one_shots).await?;
        if removed > 0 {
            ::log::info!("Removed {removed} one-time schedule(s)");
        }
        Ok(kinds)
    }

    /// Tick until `cancel` fires or the receiver goes away.
    pub async fn run(mut self, sender: mpsc::Sender<WorkflowKind>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ::log::info!("Schedule check every {}s", self.interval.as_secs());

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let kinds = match self.tick(Local::now().naive_local()).await {
                Ok(kinds) => kinds,
                Err(e) => {
                    ::log::warn!("Schedule check failed: {e}");
                    continue;
                }
            };
            for kind in kinds {
                if sender.send(kind).await.is_err() {
                    ::log::debug!("Schedule receiver closed");
                    return;
                }
            }
        }
    }
}

fn truncate_to_minute(value: NaiveDateTime) -> NaiveDateTime {
    value
        .with_second(0)
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(value)
}
