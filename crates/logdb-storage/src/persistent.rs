//! Persistent storage implementation
//!
//! This module provides a directory-backed [`RecordStorage`]. Each database
//! is kept as one `<hex id>.pdb` file holding a postcard-serialized image.
//! Every mutation rewrites the file through a temp file and an atomic rename,
//! so a reader never observes a half-written image.
//!
//! Images are cached in memory. Opening a database reloads it from disk, which
//! lets separate `FileStorage` instances on one directory see each other's
//! committed writes. Concurrent writers from different instances are not
//! coordinated: the last rename wins.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::RecordStorage;
use crate::error::StorageError;
use crate::handle::{OpenDatabase, OpenMode, RecordBuffer, RecordLock, RecordPosition};
use crate::image::{DatabaseAttributes, DatabaseId, DatabaseImage, DatabaseInfo};
use crate::memory::InMemoryStorage;
use crate::quota::StorageQuota;
use crate::tags::FourCc;

const IMAGE_EXTENSION: &str = "pdb";

/// Directory-backed implementation of RecordStorage
#[derive(Debug)]
pub struct FileStorage {
    /// Directory holding one file per database
    root: PathBuf,
    /// Loaded images
    cache: InMemoryStorage,
    /// Whether to fsync image files before renaming them into place
    sync_writes: bool,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::with_options(root, StorageQuota::default(), true)
    }

    /// Open with custom limits and sync behavior
    pub fn with_options(
        root: impl AsRef<Path>,
        quota: StorageQuota,
        sync_writes: bool,
    ) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let storage = Self {
            root,
            cache: InMemoryStorage::with_quota(quota),
            sync_writes,
        };
        storage.load_all()?;
        Ok(storage)
    }

    /// Storage directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lock count of one record, for verifying lock pairing
    pub fn lock_count(&self, id: DatabaseId, index: usize) -> Result<u16, StorageError> {
        self.cache.lock_count(id, index)
    }

    fn image_path(&self, id: DatabaseId) -> PathBuf {
        self.root.join(format!("{}.{IMAGE_EXTENSION}", id.to_hex()))
    }

    fn read_image(path: &Path) -> Result<DatabaseImage, StorageError> {
        let bytes = fs::read(path)?;
        let mut image: DatabaseImage = postcard::from_bytes(&bytes)?;

        // A busy record was attached but never released by its writer
        let before = image.records.len();
        image.records.retain(|record| !record.busy);
        if image.records.len() != before {
            warn!(
                path = %path.display(),
                dropped = before - image.records.len(),
                "Dropped unreleased records"
            );
        }
        Ok(image)
    }

    /// Load every image file in the directory
    fn load_all(&self) -> Result<(), StorageError> {
        let mut loaded = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(IMAGE_EXTENSION) {
                continue;
            }
            match Self::read_image(&path) {
                Ok(image) => {
                    self.install(image);
                    loaded += 1;
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load database image, skipping"
                    );
                }
            }
        }
        info!(root = %self.root.display(), databases = loaded, "Loaded record storage");
        Ok(())
    }

    /// Reload one database from disk
    fn refresh(&self, id: DatabaseId) -> Result<(), StorageError> {
        let path = self.image_path(id);
        if !path.exists() {
            if self.cache.open_count(id) == 0 {
                self.ignore_locked(self.cache.evict_image(id))?;
            }
            return Ok(());
        }
        let image = Self::read_image(&path)?;
        self.install(image);
        Ok(())
    }

    fn install(&self, image: DatabaseImage) {
        let id = image.id();
        if let Err(e) = self.cache.install_image(image) {
            debug!(id = %id, error = %e, "Keeping cached image");
        }
    }

    /// Records locked by this instance keep the cached image in place
    fn ignore_locked(&self, result: Result<(), StorageError>) -> Result<(), StorageError> {
        match result {
            Err(StorageError::Locked) => Ok(()),
            other => other,
        }
    }

    fn encode_image(&self, id: DatabaseId) -> Result<Vec<u8>, StorageError> {
        self.cache
            .with_image(id, postcard::to_allocvec)?
            .map_err(|e| StorageError::serialization(e.to_string()))
    }

    /// Write one cached image to disk
    fn persist(&self, id: DatabaseId) -> Result<(), StorageError> {
        let bytes = self.encode_image(id)?;

        let path = self.image_path(id);
        let temp_path = path.with_extension(format!("{IMAGE_EXTENSION}.tmp"));
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            if self.sync_writes {
                file.sync_all()?;
            }
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    /// Apply a cache mutation and persist the result
    ///
    /// If the image cannot be written the cache is put back to its state
    /// before the mutation, so it never holds changes the disk does not.
    fn persisted<R>(
        &self,
        id: DatabaseId,
        mutate: impl FnOnce(&InMemoryStorage) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let before = self.encode_image(id)?;
        let value = mutate(&self.cache)?;
        if let Err(e) = self.persist(id) {
            self.roll_back(id, &before);
            return Err(e);
        }
        Ok(value)
    }

    fn roll_back(&self, id: DatabaseId, before: &[u8]) {
        let restored = postcard::from_bytes::<DatabaseImage>(before)
            .map_err(StorageError::from)
            .and_then(|image| self.cache.install_image(image));
        match restored {
            Ok(()) => debug!(id = %id, "Rolled back unpersisted mutation"),
            Err(e) => warn!(id = %id, error = %e, "Failed to roll back cached image"),
        }
    }
}

impl RecordStorage for FileStorage {
    fn find_by_type_creator(
        &self,
        type_tag: FourCc,
        creator: FourCc,
    ) -> Result<Option<DatabaseId>, StorageError> {
        if self.cache.find_by_type_creator(type_tag, creator)?.is_none() {
            self.load_all()?;
        }
        self.cache.find_by_type_creator(type_tag, creator)
    }

    fn find_by_name(&self, name: &str) -> Result<Option<DatabaseId>, StorageError> {
        self.refresh(DatabaseId::from_name(name))?;
        self.cache.find_by_name(name)
    }

    fn create_database(
        &self,
        name: &str,
        type_tag: FourCc,
        creator: FourCc,
    ) -> Result<DatabaseId, StorageError> {
        let id = DatabaseId::from_name(name);
        self.refresh(id)?;
        let id = self.cache.create_database(name, type_tag, creator)?;
        if let Err(e) = self.persist(id) {
            if let Err(evict_err) = self.cache.evict_image(id) {
                warn!(id = %id, error = %evict_err, "Failed to drop unpersisted database");
            }
            return Err(e);
        }
        Ok(id)
    }

    fn delete_database(&self, id: DatabaseId) -> Result<(), StorageError> {
        self.cache.delete_database(id)?;
        let path = self.image_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        debug!(id = %id, "Deleted database");
        Ok(())
    }

    fn database_info(&self, id: DatabaseId) -> Result<DatabaseInfo, StorageError> {
        self.cache.database_info(id)
    }

    fn set_database_attributes(
        &self,
        id: DatabaseId,
        attributes: DatabaseAttributes,
    ) -> Result<(), StorageError> {
        self.persisted(id, |cache| cache.set_database_attributes(id, attributes))
    }

    fn open_database(
        &self,
        id: DatabaseId,
        mode: OpenMode,
    ) -> Result<OpenDatabase<'_>, StorageError> {
        self.refresh(id)?;
        self.cache.register_open(id, mode)?;
        Ok(OpenDatabase::new(self, id, mode))
    }

    fn close_database(&self, id: DatabaseId, mode: OpenMode) {
        self.cache.close_database(id, mode);
    }

    fn open_count(&self, id: DatabaseId) -> usize {
        self.cache.open_count(id)
    }

    fn num_records(&self, id: DatabaseId) -> Result<usize, StorageError> {
        self.cache.num_records(id)
    }

    fn query_record(&self, id: DatabaseId, index: usize) -> Result<RecordLock<'_>, StorageError> {
        self.cache.query_record(id, index)
    }

    fn new_handle(&self, id: DatabaseId, size: usize) -> Result<RecordBuffer, StorageError> {
        self.cache.new_handle(id, size)
    }

    fn attach_record(
        &self,
        id: DatabaseId,
        buffer: RecordBuffer,
        position: RecordPosition,
    ) -> Result<usize, StorageError> {
        self.persisted(id, |cache| cache.attach_record(id, buffer, position))
    }

    fn write_record(
        &self,
        id: DatabaseId,
        index: usize,
        offset: usize,
        data: &[u8],
    ) -> Result<(), StorageError> {
        self.persisted(id, |cache| cache.write_record(id, index, offset, data))
    }

    fn release_record(
        &self,
        id: DatabaseId,
        index: usize,
        dirty: bool,
    ) -> Result<(), StorageError> {
        self.persisted(id, |cache| cache.release_record(id, index, dirty))
    }

    fn remove_record(&self, id: DatabaseId, index: usize) -> Result<(), StorageError> {
        self.persisted(id, |cache| cache.remove_record(id, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DATA: FourCc = FourCc::new(*b"DATA");
    const LGDB: FourCc = FourCc::new(*b"LgDB");

    fn put(db: &mut OpenDatabase<'_>, bytes: &[u8]) {
        let index = db.new_record(bytes.len()).unwrap();
        db.write_record(index, 0, bytes).unwrap();
        db.release_record(index, true).unwrap();
    }

    #[test]
    fn test_persistence_and_reload() {
        let temp_dir = TempDir::new().unwrap();

        let id = {
            let storage = FileStorage::new(temp_dir.path()).unwrap();
            let id = storage.create_database("DebugLog", DATA, LGDB).unwrap();
            let mut db = storage.open_database(id, OpenMode::ReadWrite).unwrap();
            put(&mut db, b"first");
            put(&mut db, b"second");
            id
        };

        let storage = FileStorage::new(temp_dir.path()).unwrap();
        assert_eq!(storage.find_by_type_creator(DATA, LGDB).unwrap(), Some(id));
        let db = storage.open_database(id, OpenMode::ReadOnly).unwrap();
        assert_eq!(db.num_records().unwrap(), 2);
        assert_eq!(&db.query_record(1).unwrap()[..], b"second");
    }

    #[test]
    fn test_instances_share_directory() {
        let temp_dir = TempDir::new().unwrap();
        let writer = FileStorage::new(temp_dir.path()).unwrap();
        let reader = FileStorage::new(temp_dir.path()).unwrap();

        // Created after the reader loaded the directory
        let id = writer.create_database("DebugLog", DATA, LGDB).unwrap();
        assert_eq!(reader.find_by_type_creator(DATA, LGDB).unwrap(), Some(id));

        {
            let mut db = writer.open_database(id, OpenMode::ReadWrite).unwrap();
            put(&mut db, b"from writer");
        }

        let db = reader.open_database(id, OpenMode::ReadOnly).unwrap();
        assert_eq!(db.num_records().unwrap(), 1);
    }

    #[test]
    fn test_unreleased_records_dropped_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let id = {
            let storage = FileStorage::new(temp_dir.path()).unwrap();
            let id = storage.create_database("DebugLog", DATA, LGDB).unwrap();
            let mut db = storage.open_database(id, OpenMode::ReadWrite).unwrap();
            put(&mut db, b"kept");
            // Attached and persisted but never released
            db.new_record(4).unwrap();
            id
        };

        let storage = FileStorage::new(temp_dir.path()).unwrap();
        assert_eq!(storage.num_records(id).unwrap(), 1);
    }

    #[test]
    fn test_corrupt_image_skipped() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("00ff00ff00ff00ff.pdb"), b"\xff\xff\xff").unwrap();

        let storage = FileStorage::new(temp_dir.path()).unwrap();
        assert!(storage.find_by_type_creator(DATA, LGDB).unwrap().is_none());
    }

    #[test]
    fn test_delete_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        let id = storage.create_database("DebugLog", DATA, LGDB).unwrap();
        assert!(storage.image_path(id).exists());

        storage.delete_database(id).unwrap();
        assert!(!storage.image_path(id).exists());
        assert!(storage.find_by_name("DebugLog").unwrap().is_none());
    }

    fn temp_path(storage: &FileStorage, id: DatabaseId) -> PathBuf {
        storage.image_path(id).with_extension("pdb.tmp")
    }

    #[test]
    fn test_failed_attach_leaves_no_record() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        let id = storage.create_database("DebugLog", DATA, LGDB).unwrap();
        let mut db = storage.open_database(id, OpenMode::ReadWrite).unwrap();
        put(&mut db, b"kept");

        // A directory in the temp file's place makes every write fail
        let blocker = temp_path(&storage, id);
        fs::create_dir(&blocker).unwrap();
        assert!(matches!(db.new_record(4), Err(StorageError::Io(_))));
        assert_eq!(db.num_records().unwrap(), 1);

        fs::remove_dir(&blocker).unwrap();
        put(&mut db, b"next");
        assert_eq!(db.num_records().unwrap(), 2);
        drop(db);

        let reloaded = FileStorage::new(temp_dir.path()).unwrap();
        let db = reloaded.open_database(id, OpenMode::ReadOnly).unwrap();
        assert_eq!(db.num_records().unwrap(), 2);
        assert_eq!(&db.query_record(0).unwrap()[..], b"kept");
        assert_eq!(&db.query_record(1).unwrap()[..], b"next");
    }

    #[test]
    fn test_failed_write_keeps_busy_record_removable() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        let id = storage.create_database("DebugLog", DATA, LGDB).unwrap();
        let mut db = storage.open_database(id, OpenMode::ReadWrite).unwrap();
        let index = db.new_record(3).unwrap();

        let blocker = temp_path(&storage, id);
        fs::create_dir(&blocker).unwrap();
        assert!(db.write_record(index, 0, b"abc").is_err());
        // Still attached and busy, with the old contents
        assert!(matches!(db.query_record(index), Err(StorageError::RecordBusy(0))));

        fs::remove_dir(&blocker).unwrap();
        db.remove_record(index).unwrap();
        assert_eq!(db.num_records().unwrap(), 0);
    }

    #[test]
    fn test_failed_create_is_forgotten() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        let id = DatabaseId::from_name("DebugLog");

        fs::create_dir(temp_path(&storage, id)).unwrap();
        assert!(storage.create_database("DebugLog", DATA, LGDB).is_err());
        assert_eq!(storage.cache.database_count(), 0);
        assert!(storage.find_by_type_creator(DATA, LGDB).unwrap().is_none());
    }
}
