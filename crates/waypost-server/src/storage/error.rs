//! Storage error types.

use thiserror::Error;

/// Errors from storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// I/O or backend failure.
    ///
    /// May be transient (disk pressure) or fatal (corruption). Callers
    /// surface this as an internal error without exposing the detail.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Stored value could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// A driver with this id already exists.
    ///
    /// Identifier collision on insert. Distinct from the identity-field
    /// duplicate check, which the caller runs before inserting.
    #[error("driver already exists: {0}")]
    DuplicateDriver(String),
}
