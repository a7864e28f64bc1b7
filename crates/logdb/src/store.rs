//! The log store: open, append and clear
//!
//! A [`LogStore`] binds a record storage backend to one store identity. It
//! keeps no database open between calls; every operation opens the store,
//! does its work and closes it again on every exit path.

use logdb_storage::{
    DatabaseId, OpenDatabase, OpenMode, RecordPosition, RecordStorage, StorageError,
};
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::config::{StoreConfig, UNKNOWN_APP};
use crate::error::{LogDbError, OpenStage};

/// An open log store
///
/// Closing is idempotent and also happens on drop.
#[derive(Debug)]
pub struct StoreHandle<'a> {
    db: OpenDatabase<'a>,
}

impl<'a> StoreHandle<'a> {
    fn new(db: OpenDatabase<'a>) -> Self {
        Self { db }
    }

    /// Id of the underlying database
    pub fn id(&self) -> DatabaseId {
        self.db.id()
    }

    /// Access mode the store was opened with
    pub fn mode(&self) -> OpenMode {
        self.db.mode()
    }

    /// Whether the handle has not been closed yet
    pub fn is_open(&self) -> bool {
        self.db.is_open()
    }

    /// Number of physical records, including any that do not decode
    pub fn record_count(&self) -> Result<usize, LogDbError> {
        Ok(self.db.num_records()?)
    }

    /// Close the store
    pub fn close(&mut self) {
        self.db.close();
    }

    pub(crate) fn db(&self) -> &OpenDatabase<'a> {
        &self.db
    }

    /// Append one encoded record, unwinding it if it cannot be completed
    pub(crate) fn append_record(
        &mut self,
        timestamp: u32,
        app_name: &str,
        message: &str,
    ) -> Result<usize, LogDbError> {
        let bytes = codec::encode(timestamp, app_name, message);

        let buffer = self
            .db
            .new_handle(bytes.len())
            .map_err(LogDbError::AllocationFailed)?;
        let index = self
            .db
            .attach_record(buffer, RecordPosition::End)
            .map_err(LogDbError::AttachFailed)?;

        let committed = self
            .db
            .write_record(index, 0, &bytes)
            .and_then(|()| self.db.release_record(index, true));
        if let Err(e) = committed {
            if let Err(remove_err) = self.db.remove_record(index) {
                warn!(index, error = %remove_err, "Failed to remove unfinished record");
            }
            return Err(e.into());
        }

        Ok(index)
    }

    /// Remove records from the front until the store is empty or a removal fails
    pub(crate) fn drain(&mut self) -> Result<usize, LogDbError> {
        let count = self.db.num_records()?;
        let mut removed = 0;
        for _ in 0..count {
            match self.db.remove_record(0) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(removed, remaining = count - removed, error = %e, "Clear stopped early");
                    break;
                }
            }
        }
        Ok(removed)
    }
}

/// Append-only timestamped log store
///
/// # Example
///
/// ```rust
/// use logdb::{LogStore, Order};
/// use logdb_storage::InMemoryStorage;
///
/// let store = LogStore::new(InMemoryStorage::new());
/// store.append(Some("Demo"), Some("started")).unwrap();
///
/// let first = store.records(Order::NewestFirst).unwrap().next().unwrap();
/// assert_eq!(first.app_name(), "Demo");
/// assert_eq!(first.message(), "started");
/// ```
pub struct LogStore<S, C = SystemClock> {
    storage: S,
    config: StoreConfig,
    clock: C,
}

impl<S: RecordStorage> LogStore<S> {
    /// Create a store with the default identity and the system clock
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, StoreConfig::default())
    }

    /// Create a store with a custom identity
    pub fn with_config(storage: S, config: StoreConfig) -> Self {
        Self {
            storage,
            config,
            clock: SystemClock,
        }
    }
}

impl<S: RecordStorage, C: Clock> LogStore<S, C> {
    /// Replace the clock used to stamp appended records
    pub fn with_clock<C2: Clock>(self, clock: C2) -> LogStore<S, C2> {
        LogStore {
            storage: self.storage,
            config: self.config,
            clock,
        }
    }

    /// The storage backend
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The store identity and limits
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The clock used by append
    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn find(&self) -> Result<Option<DatabaseId>, StorageError> {
        self.storage
            .find_by_type_creator(self.config.type_tag, self.config.creator_tag)
    }

    /// Open the store for writing, creating it first if it does not exist
    ///
    /// A newly created store is marked for backup and has copy prevention
    /// cleared. Existing stores keep their attributes.
    pub fn open_or_create(&self) -> Result<StoreHandle<'_>, LogDbError> {
        let id = match self
            .find()
            .map_err(|e| LogDbError::open_failed(OpenStage::Lookup, e))?
        {
            Some(id) => id,
            None => {
                self.create()?;
                self.find()
                    .map_err(|e| LogDbError::open_failed(OpenStage::Lookup, e))?
                    .ok_or_else(|| {
                        LogDbError::open_failed(
                            OpenStage::Lookup,
                            StorageError::not_found(&self.config.name),
                        )
                    })?
            }
        };

        let db = self
            .storage
            .open_database(id, OpenMode::ReadWrite)
            .map_err(|e| LogDbError::open_failed(OpenStage::Open, e))?;
        Ok(StoreHandle::new(db))
    }

    fn create(&self) -> Result<(), LogDbError> {
        let id = match self.storage.create_database(
            &self.config.name,
            self.config.type_tag,
            self.config.creator_tag,
        ) {
            Ok(id) => id,
            // Another writer created it between our lookup and create
            Err(StorageError::AlreadyExists(_)) => return Ok(()),
            Err(e) => return Err(LogDbError::create_failed(e)),
        };

        let attributes = self.storage.database_info(id).map(|info| {
            let mut attributes = info.header.attributes;
            attributes.backup = true;
            attributes.copy_prevention = false;
            attributes
        });
        if let Err(e) =
            attributes.and_then(|attributes| self.storage.set_database_attributes(id, attributes))
        {
            warn!(id = %id, error = %e, "Could not set attributes on new log store");
        }

        info!(
            name = %self.config.name,
            type_tag = %self.config.type_tag,
            creator = %self.config.creator_tag,
            "Created log store"
        );
        Ok(())
    }

    /// Open the store for reading
    ///
    /// Returns `None` if the store has never been created.
    pub fn open_read_only(&self) -> Result<Option<StoreHandle<'_>>, LogDbError> {
        let Some(id) = self
            .find()
            .map_err(|e| LogDbError::open_failed(OpenStage::Lookup, e))?
        else {
            debug!(name = %self.config.name, "Log store not found");
            return Ok(None);
        };

        let db = self
            .storage
            .open_database(id, OpenMode::ReadOnly)
            .map_err(|e| LogDbError::open_failed(OpenStage::Open, e))?;
        Ok(Some(StoreHandle::new(db)))
    }

    /// Append one record stamped with the current time
    ///
    /// A missing or empty app name is recorded as `UnknownApp` and a missing
    /// message as the empty string. Both strings end at their first NUL.
    /// Returns the timestamp that was written.
    ///
    /// # Errors
    ///
    /// [`LogDbError::RecordTooLarge`] if the encoded record would exceed the
    /// configured limit (the store is not touched), otherwise
    /// `StoreUnavailable`, `AllocationFailed`, `AttachFailed` or `Storage`.
    /// On failure no partial record is left in the store.
    #[instrument(skip_all, fields(store = %self.config.name))]
    pub fn append(
        &self,
        app_name: Option<&str>,
        message: Option<&str>,
    ) -> Result<u32, LogDbError> {
        let app_name = app_name
            .map(until_nul)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_APP);
        let message = message.map(until_nul).unwrap_or_default();

        let size = codec::encoded_len(app_name, message);
        if size > self.config.max_record_size {
            return Err(LogDbError::RecordTooLarge {
                size,
                max: self.config.max_record_size,
            });
        }

        let mut handle = self.open_or_create()?;
        let timestamp = self.clock.now_seconds();
        let index = handle.append_record(timestamp, app_name, message)?;
        handle.close();

        debug!(index, timestamp, app = app_name, size, "Appended log record");
        Ok(timestamp)
    }

    /// Remove every record
    ///
    /// Best effort: a failed removal stops the loop but is not an error.
    /// Returns the number of records removed.
    #[instrument(skip_all, fields(store = %self.config.name))]
    pub fn clear(&self) -> Result<usize, LogDbError> {
        let mut handle = self.open_or_create()?;
        let removed = handle.drain()?;
        handle.close();

        info!(removed, "Cleared log store");
        Ok(removed)
    }

    /// Number of physical records, zero if the store does not exist
    pub fn record_count(&self) -> Result<usize, LogDbError> {
        match self.open_read_only()? {
            Some(handle) => handle.record_count(),
            None => Ok(0),
        }
    }
}

impl<S, C> std::fmt::Debug for LogStore<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The prefix of `s` before its first NUL
pub(crate) fn until_nul(s: &str) -> &str {
    s.split('\0').next().unwrap_or_default()
}
