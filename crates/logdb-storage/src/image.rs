//! Database images
//!
//! A [`DatabaseImage`] is the complete state of one record database: its
//! header and the ordered list of records. Backends keep images in memory and
//! may persist them as postcard blobs.

use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::tags::FourCc;

/// Longest database name, excluding the terminator the handheld stores
pub const MAX_NAME_LEN: usize = 31;

/// Stable identifier of a database within a storage
///
/// Derived from the database name so that independent storage instances
/// pointing at the same data agree on ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseId(u64);

impl DatabaseId {
    /// Derive the id for a database name
    pub fn from_name(name: &str) -> Self {
        let hash = blake3::hash(name.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        Self(u64::from_be_bytes(bytes))
    }

    /// Raw id value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Hex form, used for file names
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Validate a database name
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('\0') {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Database-level attribute flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseAttributes {
    /// Include the database in host backups
    pub backup: bool,
    /// Forbid copying the database to another device
    pub copy_prevention: bool,
    /// Database cannot be opened for writing
    pub read_only: bool,
}

/// Database header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseHeader {
    /// Human-readable name, unique per storage
    pub name: String,
    /// Type tag
    pub type_tag: FourCc,
    /// Creator tag
    pub creator: FourCc,
    /// Attribute flags
    pub attributes: DatabaseAttributes,
    /// Creation time
    pub created_at_millis: i64,
    /// Last modification time
    pub modified_at_millis: i64,
    /// Incremented on every committed mutation
    pub modification_number: u32,
}

/// Snapshot of a database header plus its record count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub id: DatabaseId,
    pub header: DatabaseHeader,
    pub record_count: usize,
}

/// A single record and its bookkeeping flags
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordEntry {
    /// Record bytes
    pub data: Vec<u8>,
    /// Modified since the last sync
    pub dirty: bool,
    /// Attached but not yet released by its writer
    pub busy: bool,
    /// Identifier unique within the database
    pub unique_id: u32,
    /// Outstanding read locks
    #[serde(skip)]
    locks: AtomicU16,
}

impl RecordEntry {
    /// Create a busy entry around freshly allocated bytes
    pub fn new_busy(data: Vec<u8>, unique_id: u32) -> Self {
        Self {
            data,
            dirty: false,
            busy: true,
            unique_id,
            locks: AtomicU16::new(0),
        }
    }

    /// Number of outstanding locks on this record
    pub fn lock_count(&self) -> u16 {
        self.locks.load(Ordering::SeqCst)
    }

    pub(crate) fn acquire_lock(&self) -> u16 {
        self.locks.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn release_lock(&self) {
        self.locks.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Complete state of one record database
#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseImage {
    pub header: DatabaseHeader,
    pub records: Vec<RecordEntry>,
    pub next_unique_id: u32,
}

impl DatabaseImage {
    /// Create an empty database image
    pub fn new(name: &str, type_tag: FourCc, creator: FourCc) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            header: DatabaseHeader {
                name: name.to_string(),
                type_tag,
                creator,
                attributes: DatabaseAttributes::default(),
                created_at_millis: now,
                modified_at_millis: now,
                modification_number: 0,
            },
            records: Vec::new(),
            next_unique_id: 1,
        }
    }

    /// Id of this database
    pub fn id(&self) -> DatabaseId {
        DatabaseId::from_name(&self.header.name)
    }

    /// Bytes of record data held
    pub fn total_bytes(&self) -> usize {
        self.records.iter().map(|r| r.data.len()).sum()
    }

    /// Header and record count
    pub fn info(&self) -> DatabaseInfo {
        DatabaseInfo {
            id: self.id(),
            header: self.header.clone(),
            record_count: self.records.len(),
        }
    }

    /// Take the next record unique id
    pub fn allocate_unique_id(&mut self) -> u32 {
        let id = self.next_unique_id;
        self.next_unique_id = self.next_unique_id.wrapping_add(1).max(1);
        id
    }

    /// Record a committed mutation
    pub fn touch(&mut self) {
        self.header.modified_at_millis = chrono::Utc::now().timestamp_millis();
        self.header.modification_number = self.header.modification_number.wrapping_add(1);
    }
}
