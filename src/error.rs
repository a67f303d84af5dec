// src/error.rs

//! Unified error handling for the export automation.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for automation operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Login sequence exhausted its attempts
    #[error("Login failed after {attempts} attempt(s): {message}")]
    Auth { attempts: u32, message: String },

    /// A step while queuing exports failed
    #[error("Navigation failed at '{step}': {message}")]
    Navigation { step: String, message: String },

    /// A bounded wait ran out of time
    #[error("Timed out after {}s waiting for {what}", .after.as_secs())]
    Timeout { what: String, after: Duration },

    /// The driver could not resolve a locator
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// One notification row could not be read
    #[error("Notification row {index} unreadable: {message}")]
    RowParse { index: usize, message: String },

    /// A download could not be triggered or saved
    #[error("Download of '{file}' failed: {message}")]
    Download { file: String, message: String },

    /// The browser was closed underneath the automation
    #[error("Browser session was closed")]
    SessionClosed,

    /// The run was cancelled
    #[error("Run cancelled")]
    Cancelled,

    /// Any other driver-level failure
    #[error("Driver error: {0}")]
    Driver(String),

    /// External executable failure
    #[error("Process error for {program}: {message}")]
    Process { program: String, message: String },

    /// Credential store failure or missing credential
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Another workflow run is still active
    #[error("A workflow run is already active ({0})")]
    Busy(String),

    /// Schedule entry could not be parsed or stored
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a timeout error.
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }

    /// Create a navigation error for the named step.
    pub fn navigation(step: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Navigation {
            step: step.into(),
            message: message.to_string(),
        }
    }

    /// Create a download error for the given file.
    pub fn download(file: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Download {
            file: file.into(),
            message: message.to_string(),
        }
    }

    /// Create a process error for the given program.
    pub fn process(program: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Process {
            program: program.into(),
            message: message.to_string(),
        }
    }

    /// Create a driver error.
    pub fn driver(message: impl fmt::Display) -> Self {
        Self::Driver(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a credential error.
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials(message.into())
    }

    /// Whether the browser went away underneath us.
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Self::SessionClosed)
    }

    /// Whether this error is a bounded wait running out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Process exit status reported to the host: 2 when the browser was
    /// closed externally, 1 for anything else.
    pub fn exit_code(&self) -> i32 {
        if self.is_session_closed() { 2 } else { 1 }
    }
}
