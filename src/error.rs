//! Error types
//!
//! Infeasible design points are not errors; they produce the zero
//! sentinel result instead.

use thiserror::Error;

/// Result type for optimizer operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A design point or configuration value is out of its valid domain
    #[error("invalid input: {field} {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// A record field could not be parsed as a number
    #[error("line {line}: cannot parse {field} from '{value}'")]
    Parse {
        line: usize,
        field: &'static str,
        value: String,
    },

    /// A record has the wrong shape
    #[error("line {line}: {reason}")]
    Record { line: usize, reason: String },

    /// The lookup table cannot serve the design point
    #[error("BRAM table mismatch: {0}")]
    TableMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// The worker pool could not be started
    #[error("worker pool error: {0}")]
    Pool(String),
}

impl Error {
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}
