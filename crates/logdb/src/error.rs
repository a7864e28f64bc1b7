//! Error types for the log store

use std::fmt;

use logdb_storage::StorageError;
use thiserror::Error;

/// Step of opening the store that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStage {
    /// Creating the database
    Create,
    /// Finding the database after creating it
    Lookup,
    /// Opening the database that was found
    Open,
}

impl fmt::Display for OpenStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenStage::Create => write!(f, "create"),
            OpenStage::Lookup => write!(f, "lookup"),
            OpenStage::Open => write!(f, "open"),
        }
    }
}

/// Errors returned by log store operations
///
/// Corrupt records and a store that was never created are not errors: the
/// first is skipped during enumeration and the second enumerates as empty.
#[derive(Debug, Error)]
pub enum LogDbError {
    /// The store could not be created or opened
    #[error("Log store unavailable ({stage} failed): {source}")]
    StoreUnavailable {
        stage: OpenStage,
        #[source]
        source: StorageError,
    },

    /// No space for a new record
    #[error("Record allocation failed: {0}")]
    AllocationFailed(#[source] StorageError),

    /// The new record could not be inserted
    #[error("Record attach failed: {0}")]
    AttachFailed(#[source] StorageError),

    /// The enumeration sort index could not be allocated
    #[error("Could not allocate sort index for {records} records")]
    IndexAllocationFailed { records: usize },

    /// Encoded record would exceed the per-record size limit
    #[error("Log record of {size} bytes exceeds the {max} byte limit")]
    RecordTooLarge { size: usize, max: usize },

    /// Any other storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LogDbError {
    /// Create a StoreUnavailable error for a failed create
    pub fn create_failed(source: StorageError) -> Self {
        Self::StoreUnavailable {
            stage: OpenStage::Create,
            source,
        }
    }

    /// Create a StoreUnavailable error for a failed lookup or open
    pub fn open_failed(stage: OpenStage, source: StorageError) -> Self {
        Self::StoreUnavailable { stage, source }
    }

    /// Whether the store itself could not be reached
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
