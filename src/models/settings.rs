//! User settings persisted between runs.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};
use crate::models::ScheduleEntry;

/// Key-value record edited by the user and read by the workflows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Folder the browser downloads into
    #[serde(default, deserialize_with = "empty_as_none")]
    pub download_path: Option<PathBuf>,

    /// Folder receiving the canonical flat files
    #[serde(default, deserialize_with = "empty_as_none")]
    pub destination_path: Option<PathBuf>,

    /// Workbook handed to the pivot refresh
    #[serde(default, deserialize_with = "empty_as_none")]
    pub excel_path: Option<PathBuf>,

    /// Workbook handed to the NPD refresh
    #[serde(default, deserialize_with = "empty_as_none")]
    pub npd_path: Option<PathBuf>,

    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
}

impl Settings {
    /// Download and destination folders, both required.
    pub fn transfer_paths(&self) -> Result<(PathBuf, PathBuf)> {
        match (&self.download_path, &self.destination_path) {
            (Some(download), Some(destination)) => Ok((download.clone(), destination.clone())),
            _ => Err(AppError::config(
                "downloadPath and destinationPath must be set",
            )),
        }
    }

    /// Paths a scheduled run needs: both transfer folders and the
    /// pivot workbook.
    pub fn check_schedulable(&self) -> Result<()> {
        self.transfer_paths()?;
        if self.excel_path.is_none() {
            return Err(AppError::Schedule(
                "excelPath must be set before scheduling".into(),
            ));
        }
        Ok(())
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<PathBuf>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from))
}
