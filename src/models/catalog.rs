// src/models/catalog.rs

//! Report catalog: the report groups reachable from the portal favorites
//! and the export dialog choices, described as data.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::driver::Locator;
use crate::error::{AppError, Result};

/// Canonical report names collected by the automation.
pub const TARGET_FILES: [&str; 7] = [
    "Flat File - CD",
    "Flat File - NWNI",
    "Flat File - PSNI",
    "Flat File - FSSI",
    "Flat File - Petrol CDNISI",
    "Flat File - TSM NI/SI",
    "Flat File - Chemist Warehouse",
];

/// What to do with an element once it is visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "option")]
pub enum StepAction {
    Click,
    Check,
    Select(String),
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepAction::Click => write!(f, "click"),
            StepAction::Check => write!(f, "check"),
            StepAction::Select(_) => write!(f, "select"),
        }
    }
}

/// One "locate, wait until visible, act" instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub selector: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_text: Option<String>,

    pub action: StepAction,

    /// Human readable label used in progress lines
    pub description: String,
}

impl Step {
    pub fn click(selector: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            has_text: None,
            action: StepAction::Click,
            description: description.into(),
        }
    }

    pub fn check(selector: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            action: StepAction::Check,
            ..Self::click(selector, description)
        }
    }

    pub fn select(
        selector: impl Into<String>,
        option: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action: StepAction::Select(option.into()),
            ..Self::click(selector, description)
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.has_text = Some(text.into());
        self
    }

    pub fn locator(&self) -> Locator {
        let locator = Locator::new(&self.selector);
        match &self.has_text {
            Some(text) => locator.with_text(text),
            None => locator,
        }
    }
}

/// A portal entry point and the reports exported from its dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportGroup {
    pub name: String,

    /// Steps leading from anywhere in the portal to the dashboard
    pub navigation: Vec<Step>,

    /// Report tabs on that dashboard, in export order
    pub files: Vec<String>,
}

/// Ordered set of canonical report names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFileSet {
    names: Vec<String>,
}

impl TargetFileSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self { names: Vec::new() };
        for name in names {
            let name = name.into();
            if !set.contains(&name) {
                set.names.push(name);
            }
        }
        set
    }

    /// The seven flat files the automation is built around.
    pub fn standard() -> Self {
        Self::new(TARGET_FILES)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The fixed report catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub groups: Vec<ReportGroup>,
}

impl Catalog {
    /// Catalog of the portal favorites holding the flat files.
    pub fn standard() -> Self {
        let favorites = || Step::click("#FavoritesLink", "Favorites");

        Self {
            groups: vec![
                ReportGroup {
                    name: "Flat Files 2".to_string(),
                    navigation: vec![
                        favorites(),
                        Step::click("span", "Flat Files 2").with_text("Flat Files 2"),
                        Step::click("div.thumb-box", "Open CD card").with_text("Flat File - CD"),
                    ],
                    files: [
                        "Flat File - CD",
                        "Flat File - NWNI",
                        "Flat File - PSNI",
                        "Flat File - FSSI",
                        "Flat File - Petrol CDNISI",
                    ]
                    .map(String::from)
                    .to_vec(),
                },
                ReportGroup {
                    name: "TSM".to_string(),
                    navigation: vec![
                        favorites(),
                        Step::click("span", "Flat File - TSM NI/SI")
                            .with_text("Flat File - TSM NI/SI"),
                    ],
                    files: vec!["Flat File - TSM NI/SI".to_string()],
                },
                ReportGroup {
                    name: "Chemist Warehouse".to_string(),
                    navigation: vec![
                        favorites(),
                        Step::click("span", "Flat File - Chemist Warehouse")
                            .with_text("Flat File - Chemist Warehouse"),
                    ],
                    files: vec!["Flat File - Chemist Warehouse".to_string()],
                },
            ],
        }
    }

    /// Check that every catalog file is a target and names are not repeated.
    pub fn validate(&self, targets: &TargetFileSet) -> Result<()> {
        let mut seen = Vec::new();
        for group in &self.groups {
            if group.navigation.is_empty() {
                return Err(AppError::validation(format!(
                    "Report group '{}' has no navigation steps",
                    group.name
                )));
            }
            for file in &group.files {
                if !targets.contains(file) {
                    return Err(AppError::validation(format!(
                        "Catalog file '{}' in group '{}' is not a target file",
                        file, group.name
                    )));
                }
                if seen.contains(&file) {
                    return Err(AppError::validation(format!(
                        "Catalog file '{file}' appears more than once"
                    )));
                }
                seen.push(file);
            }
        }
        Ok(())
    }

    pub fn file_count(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }
}

/// Export dialog sequence for one report tab.
///
/// The time option must be picked between the two select-all checks.
pub fn export_steps(file_name: &str) -> Vec<Step> {
    vec![
        Step::click("ul#report-nav-scroll li.reportNavLi", format!("{file_name} tab"))
            .with_text(file_name),
        Step::click("div.dashboard-action span.db-action-link", "Action button")
            .with_text("Action"),
        Step::click(
            "#reportContainer div.actionModal li.action-modal-item span",
            "Export option",
        )
        .with_text("Export"),
        Step::check("div.selectAll label.check-label", "SelectAll (Geo)"),
        Step::select("div.iterate-select select", "1: Object", "Time option"),
        Step::check("div.selectAll label.check-label", "SelectAll (Time)"),
        Step::check("div.fileType label.check-label span", "Excel file type")
            .with_text("Excel Spreadsheet"),
        Step::check("ul li label.check-label span", "Pivot Table").with_text("Pivot Table"),
        Step::click("div.modal-footer div.exp-footer-button button", "Export button")
            .with_text("Export"),
        Step::click("div.modal-dialog div.modal-content div button", "Okay button")
            .with_text("Okay"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_is_valid() {
        let catalog = Catalog::standard();
        assert!(catalog.validate(&TargetFileSet::standard()).is_ok());
        assert_eq!(catalog.file_count(), TARGET_FILES.len());
    }

    #[test]
    fn test_catalog_rejects_unknown_file() {
        let catalog = Catalog::standard();
        let targets = TargetFileSet::new(["Flat File - CD"]);
        assert!(matches!(
            catalog.validate(&targets),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_target_set_dedups_and_keeps_order() {
        let set = TargetFileSet::new(["B", "A", "B"]);
        assert_eq!(set.names(), ["B".to_string(), "A".to_string()]);
        assert!(set.contains("A"));
        assert!(!set.contains("C"));
    }

    #[test]
    fn test_export_steps_select_between_select_alls() {
        let steps = export_steps("Flat File - CD");
        let select = steps
            .iter()
            .position(|s| matches!(s.action, StepAction::Select(_)))
            .unwrap();
        let checks: Vec<usize> = steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.selector == "div.selectAll label.check-label")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(checks.len(), 2);
        assert!(checks[0] < select && select < checks[1]);
        assert_eq!(steps[0].has_text.as_deref(), Some("Flat File - CD"));
    }

    #[test]
    fn test_step_locator_carries_text() {
        let step = Step::click("span", "x").with_text("Flat Files 2");
        let locator = step.locator();
        assert_eq!(locator.selector, "span");
        assert_eq!(locator.has_text.as_deref(), Some("Flat Files 2"));
    }
}
