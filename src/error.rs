//! Engine error types.

use thiserror::Error;

use crate::config::SettingsError;
use crate::executor::ExecutorError;

/// Result type for view operations.
pub type ViewResult<T> = Result<T, ViewError>;

/// Errors raised while building filters, compiling, merging or writing views.
#[derive(Error, Debug)]
pub enum ViewError {
    /// A filter references an attribute absent from, or inapplicable to, the root entities.
    #[error("schema error: {0}")]
    Schema(String),

    /// An incompatible child filter was added to an association node.
    #[error("composition error: {0}")]
    Composition(String),

    /// The execution collaborator reported a failure.
    #[error("execution failed: {0}")]
    Execution(#[source] ExecutorError),

    /// A write-back step could not resolve a property/attribute pair.
    #[error("cannot resolve {column} on {entity_path}")]
    Resolution {
        entity_path: String,
        column: String,
    },

    /// Malformed or out-of-range path address.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A row to be written has no value for a key column.
    #[error("row {row} of {entity_path} has no value for key column {column}")]
    MissingKey {
        entity_path: String,
        row: usize,
        column: String,
    },

    /// Closing a validity interval matched no open row: the row was read at
    /// a past point in time, or another writer closed it first.
    #[error("no open version of '{entity_path}' matches {keys}")]
    StaleVersion { entity_path: String, keys: String },

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl ViewError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        ViewError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
