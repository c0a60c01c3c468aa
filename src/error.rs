use std::path::PathBuf;
use thiserror::Error;

/// Startup failures while reading and joining the input files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input file not found: {path:?}")]
    NotFound { path: PathBuf },
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed input {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("statistics key {key:?} appears on line {first_line} and again on line {line}")]
    DuplicateKey {
        key: String,
        first_line: u64,
        line: u64,
    },
}

impl LoadError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        LoadError::Malformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures of a single render or callback dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("unknown measure column {0:?}")]
    UnknownMeasure(String),
    #[error("no callback registered for {component}.{property}")]
    UnknownTrigger { component: String, property: String },
    #[error("invalid value for {component}.{property}: {reason}")]
    InvalidInput {
        component: String,
        property: String,
        reason: String,
    },
}

/// Dashboard configuration that does not fit the loaded table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DashboardError {
    #[error("no measures declared for the dropdown")]
    NoMeasures,
    #[error("declared measure {0:?} is not a column of the statistics table")]
    UndeclaredColumn(String),
    #[error("default measure {0:?} is not one of the dropdown options")]
    UnknownDefault(String),
}
