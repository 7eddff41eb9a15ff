use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WardenStorageError {
    /// An insert would have violated a unique key
    #[error("Unique key conflict: {0}")]
    Conflict(String),

    /// A record referenced by a write does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A record handed to the store is malformed
    #[error("Invalid record: {0}")]
    Invalid(String),

    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),

    /// An error that occurs when working with a cache backend
    #[error("Cache backend error: {0}")]
    Cache(String),
}
