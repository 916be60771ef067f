//! Error types for seedroll

use thiserror::Error;

/// Result type alias for seedroll operations
pub type GenResult<T> = Result<T, GenError>;

/// Errors raised while inspecting schemas and synthesizing statements
#[derive(Debug, Error)]
pub enum GenError {
    /// Query execution error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// The requested relation is not visible on the connection's search path
    #[error("Table '{0}' does not exist in the database")]
    TableNotFound(String),

    /// A lookup returned no rows
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input (identifier, condition template, parameter count)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Artifact I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a missing-table error
    pub fn is_table_not_found(&self) -> bool {
        matches!(self, Self::TableNotFound(_))
    }
}
