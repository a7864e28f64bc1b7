//! Quota management for record storage
//!
//! Limits on record size, record count and total bytes held by one database.
//! These stand in for the handheld's fixed chunk and heap limits.

/// Largest single record the handheld can allocate
pub const MAX_RECORD_SIZE: usize = 65_535;

/// Record indices are 16-bit on the handheld
pub const MAX_RECORDS: usize = 65_535;

/// Default storage heap size per database
pub const DEFAULT_MAX_TOTAL_BYTES: usize = 16 * 1024 * 1024;

/// Manages storage limits for a record database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageQuota {
    /// Largest record that can be allocated
    max_record_size: usize,
    /// Maximum number of records per database
    max_records: usize,
    /// Maximum bytes of record data per database
    max_total_bytes: usize,
}

impl Default for StorageQuota {
    fn default() -> Self {
        Self {
            max_record_size: MAX_RECORD_SIZE,
            max_records: MAX_RECORDS,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

impl StorageQuota {
    /// Create a quota with explicit limits
    pub fn new(max_record_size: usize, max_records: usize, max_total_bytes: usize) -> Self {
        Self {
            max_record_size,
            max_records,
            max_total_bytes,
        }
    }

    /// Create a builder
    pub fn builder() -> StorageQuotaBuilder {
        StorageQuotaBuilder::default()
    }

    /// Get the per-record size limit
    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }

    /// Get the per-database record count limit
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Get the per-database byte limit
    pub fn max_total_bytes(&self) -> usize {
        self.max_total_bytes
    }

    /// Check if a record of `size` bytes is too large to allocate
    pub fn exceeds_record_size(&self, size: usize) -> bool {
        size > self.max_record_size
    }

    /// Check if allocating `size` more bytes would exceed the byte limit
    pub fn would_exceed_total_bytes(&self, current_bytes: usize, size: usize) -> bool {
        current_bytes.saturating_add(size) > self.max_total_bytes
    }

    /// Check if attaching one more record would exceed the count limit
    pub fn would_exceed_records(&self, current_count: usize) -> bool {
        current_count >= self.max_records
    }
}

/// Builder for StorageQuota
#[derive(Debug, Default)]
pub struct StorageQuotaBuilder {
    max_record_size: Option<usize>,
    max_records: Option<usize>,
    max_total_bytes: Option<usize>,
}

impl StorageQuotaBuilder {
    /// Set the per-record size limit
    pub fn max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = Some(size);
        self
    }

    /// Set the record count limit
    pub fn max_records(mut self, count: usize) -> Self {
        self.max_records = Some(count);
        self
    }

    /// Set the byte limit
    pub fn max_total_bytes(mut self, bytes: usize) -> Self {
        self.max_total_bytes = Some(bytes);
        self
    }

    /// Build the quota, using defaults for unset limits
    pub fn build(self) -> StorageQuota {
        let default = StorageQuota::default();
        StorageQuota {
            max_record_size: self.max_record_size.unwrap_or(default.max_record_size),
            max_records: self.max_records.unwrap_or(default.max_records),
            max_total_bytes: self.max_total_bytes.unwrap_or(default.max_total_bytes),
        }
    }
}
