//! Error types for logdb-storage
//!
//! This module defines the error types used throughout the storage crate.

use thiserror::Error;

/// Errors that can occur in record database operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested database was not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A database with the same name already exists
    #[error("Database already exists: {0}")]
    AlreadyExists(String),

    /// Database cannot be deleted while it is open
    #[error("Database is open: {0}")]
    DatabaseOpen(String),

    /// Database name is empty or too long
    #[error("Invalid database name: {0}")]
    InvalidName(String),

    /// Storage capacity has been exceeded
    #[error("Storage capacity exceeded")]
    CapacityExceeded,

    /// A single record would exceed the per-record size limit
    #[error("Record of {size} bytes exceeds the {max} byte limit")]
    RecordTooLarge { size: usize, max: usize },

    /// The record could not be inserted into the database
    #[error("Record could not be attached: {0}")]
    AttachFailed(String),

    /// Record index is past the end of the database
    #[error("Record index {index} out of range ({count} records)")]
    IndexOutOfRange { index: usize, count: usize },

    /// A write would run past the end of the record
    #[error("Write of {len} bytes at offset {offset} exceeds record size {size}")]
    WriteOutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// Operation attempted on a closed handle
    #[error("Database handle is closed")]
    Closed,

    /// Mutation attempted through a read-only handle
    #[error("Database opened read-only")]
    ReadOnly,

    /// Record is attached but not yet released by its writer
    #[error("Record {0} is busy")]
    RecordBusy(usize),

    /// Record lock count limit reached
    #[error("Record {0} is overlocked")]
    Overlocked(usize),

    /// Mutation attempted while records are locked
    #[error("Database has locked records")]
    Locked,

    /// Error during serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during deserialization
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl StorageError {
    /// Create a new NotFound error
    pub fn not_found(item: impl Into<String>) -> Self {
        Self::NotFound(item.into())
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new Deserialization error
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

/// Convert from postcard Error to StorageError
impl From<postcard::Error> for StorageError {
    fn from(err: postcard::Error) -> Self {
        StorageError::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = StorageError::not_found("DebugLog");
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(err.to_string().contains("DebugLog"));
    }

    #[test]
    fn test_record_too_large_message() {
        let err = StorageError::RecordTooLarge {
            size: 70_000,
            max: 65_535,
        };
        assert!(err.to_string().contains("70000"));
        assert!(err.to_string().contains("65535"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
    }

    #[test]
    fn test_deserialization_error() {
        let err = StorageError::deserialization("corrupted image");
        assert!(matches!(err, StorageError::Deserialization(_)));
    }
}
