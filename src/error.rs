//! Error types for Folio.

use thiserror::Error;

use crate::library::CascadeOutcome;

/// Common error type for Folio.
#[derive(Error, Debug)]
pub enum FolioError {
    /// Database error.
    ///
    /// Wraps any failure reported by the metadata store. Errors from sqlx are
    /// converted automatically.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob storage failure or timeout.
    #[error("storage error: {0}")]
    Storage(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate folded name under the same parent folder.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A cascading delete stopped partway through.
    #[error("partial failure: {0}")]
    PartialFailure(Box<CascadeOutcome>),

    /// The folder hierarchy is deeper than allowed or contains a cycle.
    #[error("corrupt folder hierarchy: {0}")]
    CorruptHierarchy(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FolioError {
    /// Whether this error belongs to the storage class (database, blob or I/O).
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            FolioError::Database(_)
                | FolioError::DatabaseConnection(_)
                | FolioError::Io(_)
                | FolioError::Storage(_)
        )
    }

    /// Whether the error is meant to be shown next to the offending form field.
    ///
    /// Everything else maps to a not-found or a generic failure, with details
    /// kept in the logs.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, FolioError::Conflict(_) | FolioError::Validation(_))
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for FolioError {
    fn from(e: sqlx::Error) -> Self {
        FolioError::Database(e.to_string())
    }
}

/// Result type alias for Folio operations.
pub type Result<T> = std::result::Result<T, FolioError>;
