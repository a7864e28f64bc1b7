//! # LogDB Storage
//!
//! Flat record-oriented database primitive used by the LogDB log store.
//!
//! A storage holds named databases, each identified by a name plus a type and
//! creator tag. A database is an ordered list of variable-length byte records
//! addressed by physical index. Records are allocated, attached, written and
//! released by a writer, and read through scoped locks.
//!
//! ## Features
//!
//! - **RecordStorage trait**: Catalog and record operations, object safe
//! - **InMemoryStorage**: Shared in-memory implementation for tests and tools
//! - **FileStorage**: Directory-backed implementation, one file per database
//! - **StorageQuota**: Record size, record count and byte limits
//!
//! ## Example
//!
//! ```rust
//! use logdb_storage::{FourCc, InMemoryStorage, OpenMode, RecordStorage};
//!
//! let storage = InMemoryStorage::new();
//! let id = storage
//!     .create_database("DebugLog", FourCc::new(*b"DATA"), FourCc::new(*b"LgDB"))
//!     .unwrap();
//!
//! let mut db = storage.open_database(id, OpenMode::ReadWrite).unwrap();
//! let index = db.new_record(5).unwrap();
//! db.write_record(index, 0, b"hello").unwrap();
//! db.release_record(index, true).unwrap();
//!
//! let record = db.query_record(index).unwrap();
//! assert_eq!(&record[..], b"hello");
//! ```

pub mod error;
pub mod handle;
pub mod image;
pub mod memory;
pub mod persistent;
pub mod quota;
pub mod tags;

// Re-exports
pub use error::StorageError;
pub use handle::{MAX_LOCK_COUNT, OpenDatabase, OpenMode, RecordBuffer, RecordLock, RecordPosition};
pub use image::{DatabaseAttributes, DatabaseHeader, DatabaseId, DatabaseInfo, MAX_NAME_LEN};
pub use memory::InMemoryStorage;
pub use persistent::FileStorage;
pub use quota::{MAX_RECORD_SIZE, StorageQuota, StorageQuotaBuilder};
pub use tags::FourCc;

/// Trait for a flat record database store
///
/// Implementations hold any number of named databases. Record operations
/// take the database id and are normally reached through an
/// [`OpenDatabase`] handle, which enforces the access mode.
///
/// All operations run to completion on the calling thread. Mutations never
/// wait: if a record of the database is locked they fail with
/// [`StorageError::Locked`].
pub trait RecordStorage: Send + Sync {
    /// Find a database by its type and creator tags
    ///
    /// When several databases match, the one with the smallest name wins.
    fn find_by_type_creator(
        &self,
        type_tag: FourCc,
        creator: FourCc,
    ) -> Result<Option<DatabaseId>, StorageError>;

    /// Find a database by name
    fn find_by_name(&self, name: &str) -> Result<Option<DatabaseId>, StorageError>;

    /// Create an empty database
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if the name is taken and
    /// [`StorageError::InvalidName`] if it is empty or too long.
    fn create_database(
        &self,
        name: &str,
        type_tag: FourCc,
        creator: FourCc,
    ) -> Result<DatabaseId, StorageError>;

    /// Delete a database that is not open
    fn delete_database(&self, id: DatabaseId) -> Result<(), StorageError>;

    /// Header and record count of a database
    fn database_info(&self, id: DatabaseId) -> Result<DatabaseInfo, StorageError>;

    /// Replace the attribute flags of a database
    fn set_database_attributes(
        &self,
        id: DatabaseId,
        attributes: DatabaseAttributes,
    ) -> Result<(), StorageError>;

    /// Open a database
    fn open_database(&self, id: DatabaseId, mode: OpenMode)
    -> Result<OpenDatabase<'_>, StorageError>;

    /// Release one open of a database (called by [`OpenDatabase::close`])
    fn close_database(&self, id: DatabaseId, mode: OpenMode);

    /// Number of handles currently open on a database
    fn open_count(&self, id: DatabaseId) -> usize;

    /// Number of physical records
    fn num_records(&self, id: DatabaseId) -> Result<usize, StorageError>;

    /// Lock a record for reading
    fn query_record(&self, id: DatabaseId, index: usize) -> Result<RecordLock<'_>, StorageError>;

    /// Allocate a detached buffer for a new record
    fn new_handle(&self, id: DatabaseId, size: usize) -> Result<RecordBuffer, StorageError>;

    /// Attach a buffer as a new busy record, returning its index
    fn attach_record(
        &self,
        id: DatabaseId,
        buffer: RecordBuffer,
        position: RecordPosition,
    ) -> Result<usize, StorageError>;

    /// Write bytes into a record at an offset
    fn write_record(
        &self,
        id: DatabaseId,
        index: usize,
        offset: usize,
        data: &[u8],
    ) -> Result<(), StorageError>;

    /// Clear the busy flag of a record, optionally marking it dirty
    fn release_record(&self, id: DatabaseId, index: usize, dirty: bool)
    -> Result<(), StorageError>;

    /// Remove a record; later records shift down by one
    fn remove_record(&self, id: DatabaseId, index: usize) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the RecordStorage trait is object-safe
    fn _assert_object_safe(_: &dyn RecordStorage) {}

    const DATA: FourCc = FourCc::new(*b"DATA");
    const LGDB: FourCc = FourCc::new(*b"LgDB");

    #[test]
    fn test_in_memory_record_lifecycle() {
        let storage = InMemoryStorage::new();
        let id = storage.create_database("DebugLog", DATA, LGDB).unwrap();

        {
            let mut db = storage.open_database(id, OpenMode::ReadWrite).unwrap();
            let index = db.new_record(3).unwrap();
            assert_eq!(index, 0);

            // Busy until released
            assert!(matches!(db.query_record(0), Err(StorageError::RecordBusy(0))));

            db.write_record(index, 0, b"abc").unwrap();
            db.release_record(index, true).unwrap();

            let record = db.query_record(0).unwrap();
            assert_eq!(&record[..], b"abc");
        }

        assert_eq!(storage.open_count(id), 0);
        assert_eq!(storage.num_records(id).unwrap(), 1);
    }

    #[test]
    fn test_find_by_type_creator() {
        let storage = InMemoryStorage::new();
        assert!(storage.find_by_type_creator(DATA, LGDB).unwrap().is_none());

        let id = storage.create_database("DebugLog", DATA, LGDB).unwrap();
        assert_eq!(storage.find_by_type_creator(DATA, LGDB).unwrap(), Some(id));
        assert!(
            storage
                .find_by_type_creator(DATA, FourCc::new(*b"LOGR"))
                .unwrap()
                .is_none()
        );
    }
}
