//! Open database handles and record locks

use std::ops::Deref;

use parking_lot::MappedRwLockReadGuard;
use tracing::trace;

use crate::RecordStorage;
use crate::error::StorageError;
use crate::image::{DatabaseId, RecordEntry};

/// Maximum simultaneous locks on one record
pub const MAX_LOCK_COUNT: u16 = 15;

/// Access mode for an open database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Where to attach a new record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordPosition {
    /// After the last record
    #[default]
    End,
    /// At this index, shifting later records up (clamped to the end)
    At(usize),
}

/// Freshly allocated record bytes, not yet part of any database
///
/// Dropping an unattached buffer simply frees it.
#[derive(Debug)]
pub struct RecordBuffer {
    data: Vec<u8>,
}

impl RecordBuffer {
    pub(crate) fn zeroed(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    /// Size of the buffer in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is zero-sized
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Scoped read lock on one record's bytes
///
/// The record's lock count is raised while the guard lives and lowered when
/// it is dropped. Mutations of the owning database fail with
/// [`StorageError::Locked`] while any guard is held.
pub struct RecordLock<'a> {
    entry: MappedRwLockReadGuard<'a, RecordEntry>,
    index: usize,
}

impl<'a> RecordLock<'a> {
    pub(crate) fn acquire(
        entry: MappedRwLockReadGuard<'a, RecordEntry>,
        index: usize,
    ) -> Result<Self, StorageError> {
        if entry.busy {
            return Err(StorageError::RecordBusy(index));
        }
        if entry.lock_count() >= MAX_LOCK_COUNT {
            return Err(StorageError::Overlocked(index));
        }
        entry.acquire_lock();
        Ok(Self { entry, index })
    }

    /// Physical index of the locked record
    pub fn index(&self) -> usize {
        self.index
    }

    /// Unique id of the locked record
    pub fn unique_id(&self) -> u32 {
        self.entry.unique_id
    }
}

impl Deref for RecordLock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.entry.data
    }
}

impl Drop for RecordLock<'_> {
    fn drop(&mut self) {
        self.entry.release_lock();
    }
}

impl std::fmt::Debug for RecordLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLock")
            .field("index", &self.index)
            .field("len", &self.entry.data.len())
            .finish()
    }
}

/// An open database
///
/// Every open is paired with exactly one close: [`OpenDatabase::close`] is
/// idempotent and also runs on drop.
pub struct OpenDatabase<'a> {
    storage: &'a dyn RecordStorage,
    id: DatabaseId,
    mode: OpenMode,
    open: bool,
}

impl<'a> OpenDatabase<'a> {
    /// Wrap an id the backend has already registered as open
    pub fn new(storage: &'a dyn RecordStorage, id: DatabaseId, mode: OpenMode) -> Self {
        Self {
            storage,
            id,
            mode,
            open: true,
        }
    }

    /// Id of the open database
    pub fn id(&self) -> DatabaseId {
        self.id
    }

    /// Access mode
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether the handle has not been closed yet
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.open {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }

    fn ensure_writable(&self) -> Result<(), StorageError> {
        self.ensure_open()?;
        match self.mode {
            OpenMode::ReadWrite => Ok(()),
            OpenMode::ReadOnly => Err(StorageError::ReadOnly),
        }
    }

    /// Number of physical records, including busy ones
    pub fn num_records(&self) -> Result<usize, StorageError> {
        self.ensure_open()?;
        self.storage.num_records(self.id)
    }

    /// Lock a record for reading
    pub fn query_record(&self, index: usize) -> Result<RecordLock<'a>, StorageError> {
        self.ensure_open()?;
        self.storage.query_record(self.id, index)
    }

    /// Allocate a detached record buffer
    pub fn new_handle(&self, size: usize) -> Result<RecordBuffer, StorageError> {
        self.ensure_writable()?;
        self.storage.new_handle(self.id, size)
    }

    /// Attach a buffer as a new busy record, returning its index
    pub fn attach_record(
        &mut self,
        buffer: RecordBuffer,
        position: RecordPosition,
    ) -> Result<usize, StorageError> {
        self.ensure_writable()?;
        self.storage.attach_record(self.id, buffer, position)
    }

    /// Allocate and attach a busy record at the end
    pub fn new_record(&mut self, size: usize) -> Result<usize, StorageError> {
        let buffer = self.new_handle(size)?;
        self.attach_record(buffer, RecordPosition::End)
    }

    /// Write bytes into a record
    pub fn write_record(
        &mut self,
        index: usize,
        offset: usize,
        data: &[u8],
    ) -> Result<(), StorageError> {
        self.ensure_writable()?;
        self.storage.write_record(self.id, index, offset, data)
    }

    /// Release a busy record, optionally marking it dirty
    pub fn release_record(&mut self, index: usize, dirty: bool) -> Result<(), StorageError> {
        self.ensure_writable()?;
        self.storage.release_record(self.id, index, dirty)
    }

    /// Remove a record; later records shift down by one
    pub fn remove_record(&mut self, index: usize) -> Result<(), StorageError> {
        self.ensure_writable()?;
        self.storage.remove_record(self.id, index)
    }

    /// Close the handle. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            self.storage.close_database(self.id, self.mode);
            trace!(id = %self.id, "Closed database");
        }
    }
}

impl Drop for OpenDatabase<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for OpenDatabase<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenDatabase")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("open", &self.open)
            .finish()
    }
}
