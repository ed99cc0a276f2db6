//! Error types for ray tracing program configuration.

use thiserror::Error;

/// Errors raised while describing, creating or dispatching a ray tracing program.
#[derive(Error, Debug)]
pub enum RtError {
    /// Malformed program description (e.g. an empty hit group).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Lookup of an ordinal outside a table.
    #[error("Index out of range: {table} index {index} (count {count})")]
    IndexOutOfRange {
        /// Table the lookup targeted.
        table: &'static str,
        /// Requested ordinal.
        index: u32,
        /// Number of slots in the table.
        count: u32,
    },

    /// A value exceeds what the backend supports.
    #[error("Configuration limit exceeded: {what} is {value}, backend maximum is {max}")]
    ConfigurationLimitExceeded {
        /// Name of the limited quantity.
        what: &'static str,
        /// Requested value.
        value: u32,
        /// Backend maximum.
        max: u32,
    },

    /// Shader resolution or compilation failed.
    #[error("Compilation failed: {0}")]
    CompilationFailed(String),

    /// Pipeline state object construction failed.
    #[error("Backend build failed: {0}")]
    BackendBuildFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RtError {
    /// Shorthand for an [`RtError::IndexOutOfRange`] on a table of `count` slots.
    #[must_use]
    pub fn out_of_range(table: &'static str, index: u32, count: usize) -> Self {
        Self::IndexOutOfRange {
            table,
            index,
            count: u32::try_from(count).unwrap_or(u32::MAX),
        }
    }
}

/// Result type alias using [`RtError`].
pub type Result<T> = std::result::Result<T, RtError>;
