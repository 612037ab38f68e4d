//! Centralized error handling for cleanser.
//!
//! The taxonomy mirrors how a cleaning job can go wrong:
//!
//! - [`RuleError`]: a rule that is structurally invalid or cannot be applied to
//!   its column (bad regex, unknown column, mean imputation on text, ...).
//! - [`CleanserError::Resource`]: reading the source dataset or writing the
//!   export artifact failed.
//! - [`CleanserError::Timeout`]: a job exceeded its maximum duration.
//! - [`CleanserError::QueueFull`]: submission was rejected by backpressure; no
//!   job was created.
//!
//! Row-level problems are never errors. They are collected as
//! [`ValidationWarning`](crate::pipeline::ValidationWarning)s instead.
//!
//! ```
//! use cleanser::error::{CleanserError, RuleError, RuleLocation};
//!
//! let err = RuleError::at("email", RuleLocation::validation(0, "regex"), "invalid pattern");
//! assert_eq!(
//!     CleanserError::from(err).to_string(),
//!     "Rule error: column 'email' validations[0] (regex): invalid pattern"
//! );
//! ```

use std::fmt;
use std::time::Duration;

/// Where inside a rule set a [`RuleError`] was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleLocation {
    /// The column rule itself (unknown column, duplicate rule, ...)
    Column,
    Transform { index: usize, kind: &'static str },
    Validation { index: usize, kind: &'static str },
    Impute { kind: &'static str },
    Outliers,
    Deduplicate,
}

impl RuleLocation {
    pub fn transform(index: usize, kind: &'static str) -> Self {
        Self::Transform { index, kind }
    }

    pub fn validation(index: usize, kind: &'static str) -> Self {
        Self::Validation { index, kind }
    }
}

impl fmt::Display for RuleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column => write!(f, "rule"),
            Self::Transform { index, kind } => write!(f, "transforms[{index}] ({kind})"),
            Self::Validation { index, kind } => write!(f, "validations[{index}] ({kind})"),
            Self::Impute { kind } => write!(f, "impute ({kind})"),
            Self::Outliers => write!(f, "outliers"),
            Self::Deduplicate => write!(f, "deduplicate"),
        }
    }
}

/// A rule that cannot be executed against the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleError {
    pub column: Option<String>,
    pub location: Option<RuleLocation>,
    pub message: String,
}

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            column: None,
            location: None,
            message: message.into(),
        }
    }

    /// Error attached to a specific rule of a specific column.
    pub fn at(column: impl Into<String>, location: RuleLocation, message: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            location: Some(location),
            message: message.into(),
        }
    }

    /// Error attached to a dataset-level rule (outliers, deduplicate).
    pub fn dataset(location: RuleLocation, message: impl Into<String>) -> Self {
        Self {
            column: None,
            location: Some(location),
            message: message.into(),
        }
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.column, &self.location) {
            (Some(column), Some(RuleLocation::Column)) | (Some(column), None) => {
                write!(f, "column '{column}': {}", self.message)
            }
            (Some(column), Some(location)) => {
                write!(f, "column '{column}' {location}: {}", self.message)
            }
            (None, Some(location)) => write!(f, "{location}: {}", self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RuleError {}

/// Main error type for cleanser operations.
#[derive(Debug)]
pub enum CleanserError {
    /// Invalid or inapplicable rule
    Rule(RuleError),

    /// Reading the source dataset or writing the artifact failed
    Resource(String),

    /// Job exceeded its maximum duration
    Timeout(Duration),

    /// Submission rejected because the queue is at capacity
    QueueFull { capacity: usize },

    /// Unknown upload or job id
    NotFound(String),

    /// Malformed dataset handed over by a reader
    Data(String),

    /// I/O errors
    Io(std::io::Error),

    /// Configuration errors
    Config(String),

    /// Generic error with context
    Other(String),
}

impl CleanserError {
    /// Short machine-friendly category used in job failure records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rule(_) => "rule",
            Self::Resource(_) | Self::Io(_) => "resource",
            Self::Timeout(_) => "timeout",
            Self::QueueFull { .. } => "queue_full",
            Self::NotFound(_) => "not_found",
            Self::Data(_) => "data",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }

    /// Re-tag a failure as a resource problem (I/O at the job boundary).
    pub fn into_resource(self) -> Self {
        match self {
            Self::Resource(_) => self,
            Self::Io(e) => Self::Resource(e.to_string()),
            other => Self::Resource(other.to_string()),
        }
    }
}

impl fmt::Display for CleanserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule(e) => write!(f, "Rule error: {e}"),
            Self::Resource(msg) => write!(f, "Resource error: {msg}"),
            Self::Timeout(limit) => {
                write!(f, "Job exceeded its maximum duration of {}s", limit.as_secs())
            }
            Self::QueueFull { capacity } => {
                write!(f, "Job queue is full (capacity {capacity}), submission rejected")
            }
            Self::NotFound(what) => write!(f, "Not found: {what}"),
            Self::Data(msg) => write!(f, "Invalid dataset: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CleanserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rule(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RuleError> for CleanserError {
    fn from(err: RuleError) -> Self {
        Self::Rule(err)
    }
}

impl From<std::io::Error> for CleanserError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for CleanserError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for CleanserError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<csv::Error> for CleanserError {
    fn from(err: csv::Error) -> Self {
        Self::Resource(format!("CSV error: {err}"))
    }
}

impl From<polars::error::PolarsError> for CleanserError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Resource(format!("Parquet error: {err}"))
    }
}

// For CLI output and status payloads
impl From<CleanserError> for String {
    fn from(err: CleanserError) -> Self {
        err.to_string()
    }
}

/// Result type alias for cleanser operations.
pub type Result<T> = std::result::Result<T, CleanserError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<CleanserError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: CleanserError = e.into();
            CleanserError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: CleanserError = e.into();
            CleanserError::Other(format!("{}: {}", f(), err))
        })
    }
}
