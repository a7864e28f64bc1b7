//! In-memory storage implementation
//!
//! This module provides an in-memory implementation of [`RecordStorage`],
//! suitable for testing and for tools that do not need durability. Clones
//! share the same databases, the way two applications on one device see one
//! storage heap.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, trace};

use crate::RecordStorage;
use crate::error::StorageError;
use crate::handle::{OpenDatabase, OpenMode, RecordBuffer, RecordLock, RecordPosition};
use crate::image::{
    DatabaseAttributes, DatabaseId, DatabaseImage, DatabaseInfo, RecordEntry, validate_name,
};
use crate::quota::StorageQuota;
use crate::tags::FourCc;

#[derive(Debug, Default)]
struct Shared {
    /// Database images by id
    databases: RwLock<HashMap<DatabaseId, DatabaseImage>>,
    /// Open handle count per database
    open_counts: Mutex<HashMap<DatabaseId, usize>>,
    /// Capacity limits
    quota: StorageQuota,
}

/// In-memory implementation of RecordStorage
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    inner: Arc<Shared>,
}

impl InMemoryStorage {
    /// Create an empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom limits
    pub fn with_quota(quota: StorageQuota) -> Self {
        Self {
            inner: Arc::new(Shared {
                quota,
                ..Default::default()
            }),
        }
    }

    /// Get a reference to the quota
    pub fn quota(&self) -> &StorageQuota {
        &self.inner.quota
    }

    /// Number of databases held
    pub fn database_count(&self) -> usize {
        self.inner.databases.read().len()
    }

    /// Lock count of one record, for verifying lock pairing
    pub fn lock_count(&self, id: DatabaseId, index: usize) -> Result<u16, StorageError> {
        self.with_image(id, |image| {
            image
                .records
                .get(index)
                .map(RecordEntry::lock_count)
                .ok_or(StorageError::IndexOutOfRange {
                    index,
                    count: image.records.len(),
                })
        })?
    }

    /// Run `f` against a database image under a shared lock
    pub(crate) fn with_image<R>(
        &self,
        id: DatabaseId,
        f: impl FnOnce(&DatabaseImage) -> R,
    ) -> Result<R, StorageError> {
        let databases = self.inner.databases.read_recursive();
        let image = databases
            .get(&id)
            .ok_or_else(|| StorageError::not_found(format!("database {id}")))?;
        Ok(f(image))
    }

    /// Apply a mutation to a database image
    ///
    /// Fails with [`StorageError::Locked`] instead of waiting if any record
    /// lock is outstanding. The image is touched only when `f` succeeds.
    pub(crate) fn mutate<R>(
        &self,
        id: DatabaseId,
        f: impl FnOnce(&mut DatabaseImage) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let mut databases = self
            .inner
            .databases
            .try_write()
            .ok_or(StorageError::Locked)?;
        let image = databases
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found(format!("database {id}")))?;
        let result = f(image)?;
        image.touch();
        Ok(result)
    }

    /// Insert or replace a whole image (used when loading from disk)
    pub(crate) fn install_image(&self, image: DatabaseImage) -> Result<(), StorageError> {
        let mut databases = self
            .inner
            .databases
            .try_write()
            .ok_or(StorageError::Locked)?;
        databases.insert(image.id(), image);
        Ok(())
    }

    /// Forget a cached image without checking open handles
    pub(crate) fn evict_image(&self, id: DatabaseId) -> Result<(), StorageError> {
        let mut databases = self
            .inner
            .databases
            .try_write()
            .ok_or(StorageError::Locked)?;
        databases.remove(&id);
        Ok(())
    }

    pub(crate) fn register_open(&self, id: DatabaseId, mode: OpenMode) -> Result<(), StorageError> {
        let read_only = self.with_image(id, |image| image.header.attributes.read_only)?;
        if read_only && mode == OpenMode::ReadWrite {
            return Err(StorageError::ReadOnly);
        }
        *self.inner.open_counts.lock().entry(id).or_default() += 1;
        trace!(id = %id, mode = ?mode, "Opened database");
        Ok(())
    }
}

impl RecordStorage for InMemoryStorage {
    fn find_by_type_creator(
        &self,
        type_tag: FourCc,
        creator: FourCc,
    ) -> Result<Option<DatabaseId>, StorageError> {
        let databases = self.inner.databases.read_recursive();
        Ok(databases
            .values()
            .filter(|image| image.header.type_tag == type_tag && image.header.creator == creator)
            .min_by(|a, b| a.header.name.cmp(&b.header.name))
            .map(DatabaseImage::id))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<DatabaseId>, StorageError> {
        let id = DatabaseId::from_name(name);
        let databases = self.inner.databases.read_recursive();
        Ok(databases.contains_key(&id).then_some(id))
    }

    fn create_database(
        &self,
        name: &str,
        type_tag: FourCc,
        creator: FourCc,
    ) -> Result<DatabaseId, StorageError> {
        validate_name(name)?;
        let id = DatabaseId::from_name(name);

        let mut databases = self
            .inner
            .databases
            .try_write()
            .ok_or(StorageError::Locked)?;
        if databases.contains_key(&id) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        databases.insert(id, DatabaseImage::new(name, type_tag, creator));

        debug!(name, id = %id, type_tag = %type_tag, creator = %creator, "Created database");
        Ok(id)
    }

    fn delete_database(&self, id: DatabaseId) -> Result<(), StorageError> {
        if self.open_count(id) > 0 {
            return Err(StorageError::DatabaseOpen(id.to_string()));
        }
        let mut databases = self
            .inner
            .databases
            .try_write()
            .ok_or(StorageError::Locked)?;
        databases
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(format!("database {id}")))
    }

    fn database_info(&self, id: DatabaseId) -> Result<DatabaseInfo, StorageError> {
        self.with_image(id, DatabaseImage::info)
    }

    fn set_database_attributes(
        &self,
        id: DatabaseId,
        attributes: DatabaseAttributes,
    ) -> Result<(), StorageError> {
        self.mutate(id, |image| {
            image.header.attributes = attributes;
            Ok(())
        })
    }

    fn open_database(
        &self,
        id: DatabaseId,
        mode: OpenMode,
    ) -> Result<OpenDatabase<'_>, StorageError> {
        self.register_open(id, mode)?;
        Ok(OpenDatabase::new(self, id, mode))
    }

    fn close_database(&self, id: DatabaseId, _mode: OpenMode) {
        let mut counts = self.inner.open_counts.lock();
        if let Some(count) = counts.get_mut(&id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&id);
            }
        }
    }

    fn open_count(&self, id: DatabaseId) -> usize {
        self.inner.open_counts.lock().get(&id).copied().unwrap_or(0)
    }

    fn num_records(&self, id: DatabaseId) -> Result<usize, StorageError> {
        self.with_image(id, |image| image.records.len())
    }

    fn query_record(&self, id: DatabaseId, index: usize) -> Result<RecordLock<'_>, StorageError> {
        let databases = self.inner.databases.read_recursive();
        let count = databases
            .get(&id)
            .map(|image| image.records.len())
            .ok_or_else(|| StorageError::not_found(format!("database {id}")))?;

        let entry = RwLockReadGuard::try_map(databases, |dbs| {
            dbs.get(&id).and_then(|image| image.records.get(index))
        })
        .map_err(|_| StorageError::IndexOutOfRange { index, count })?;

        RecordLock::acquire(entry, index)
    }

    fn new_handle(&self, id: DatabaseId, size: usize) -> Result<RecordBuffer, StorageError> {
        let quota = &self.inner.quota;
        if quota.exceeds_record_size(size) {
            return Err(StorageError::RecordTooLarge {
                size,
                max: quota.max_record_size(),
            });
        }
        let used = self.with_image(id, DatabaseImage::total_bytes)?;
        if quota.would_exceed_total_bytes(used, size) {
            return Err(StorageError::CapacityExceeded);
        }
        Ok(RecordBuffer::zeroed(size))
    }

    fn attach_record(
        &self,
        id: DatabaseId,
        buffer: RecordBuffer,
        position: RecordPosition,
    ) -> Result<usize, StorageError> {
        let quota = self.inner.quota.clone();
        self.mutate(id, |image| {
            if quota.would_exceed_records(image.records.len()) {
                return Err(StorageError::AttachFailed(format!(
                    "database holds the maximum of {} records",
                    quota.max_records()
                )));
            }
            let index = match position {
                RecordPosition::End => image.records.len(),
                RecordPosition::At(i) => i.min(image.records.len()),
            };
            let unique_id = image.allocate_unique_id();
            image
                .records
                .insert(index, RecordEntry::new_busy(buffer.into_bytes(), unique_id));
            trace!(id = %id, index, unique_id, "Attached record");
            Ok(index)
        })
    }

    fn write_record(
        &self,
        id: DatabaseId,
        index: usize,
        offset: usize,
        data: &[u8],
    ) -> Result<(), StorageError> {
        self.mutate(id, |image| {
            let count = image.records.len();
            let entry = image
                .records
                .get_mut(index)
                .ok_or(StorageError::IndexOutOfRange { index, count })?;
            let size = entry.data.len();
            let end = offset
                .checked_add(data.len())
                .filter(|&end| end <= size)
                .ok_or(StorageError::WriteOutOfBounds {
                    offset,
                    len: data.len(),
                    size,
                })?;
            entry.data[offset..end].copy_from_slice(data);
            Ok(())
        })
    }

    fn release_record(
        &self,
        id: DatabaseId,
        index: usize,
        dirty: bool,
    ) -> Result<(), StorageError> {
        self.mutate(id, |image| {
            let count = image.records.len();
            let entry = image
                .records
                .get_mut(index)
                .ok_or(StorageError::IndexOutOfRange { index, count })?;
            entry.busy = false;
            entry.dirty |= dirty;
            Ok(())
        })
    }

    fn remove_record(&self, id: DatabaseId, index: usize) -> Result<(), StorageError> {
        self.mutate(id, |image| {
            let count = image.records.len();
            if index >= count {
                return Err(StorageError::IndexOutOfRange { index, count });
            }
            image.records.remove(index);
            trace!(id = %id, index, "Removed record");
            Ok(())
        })
    }
}
