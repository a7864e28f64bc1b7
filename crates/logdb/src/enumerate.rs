//! Enumeration engine
//!
//! Records are stored in insertion order, so every enumeration builds a
//! transient sort index of `(timestamp, physical index)` pairs from the
//! timestamp headers alone. The index is sorted newest first with a stable
//! sort; oldest first walks the same index backwards, so records that share
//! a timestamp come out in physical order one way and reversed the other.
//!
//! Strings are decoded lazily, one record at a time, as the caller advances.

use std::iter::FusedIterator;
use std::rc::Rc;

use logdb_storage::{RecordLock, RecordStorage};
use tracing::{debug, instrument, trace};

use crate::clock::Clock;
use crate::codec::{self, LogRecord, RecordSpans, RecordView};
use crate::error::LogDbError;
use crate::store::{LogStore, StoreHandle};

/// Chronological direction of an enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Order {
    /// Latest timestamp first
    #[default]
    NewestFirst,
    /// Earliest timestamp first
    OldestFirst,
}

impl Order {
    /// The opposite direction
    pub fn reversed(self) -> Self {
        match self {
            Order::NewestFirst => Order::OldestFirst,
            Order::OldestFirst => Order::NewestFirst,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    timestamp: u32,
    physical: usize,
}

/// A decoded record, locked in storage until dropped
///
/// The record shares the store handle of the [`Records`] that yielded it,
/// so the store stays open until the record is dropped, even if the
/// iterator goes first.
pub struct LogRecordRef<'a> {
    // Dropped before `handle`: the lock is released inside the open
    lock: RecordLock<'a>,
    spans: RecordSpans,
    handle: Rc<StoreHandle<'a>>,
}

impl LogRecordRef<'_> {
    /// Seconds since the handheld epoch
    pub fn timestamp(&self) -> u32 {
        self.spans.timestamp
    }

    pub fn app_name(&self) -> &str {
        self.view().app_name
    }

    pub fn message(&self) -> &str {
        self.view().message
    }

    /// Borrowed view of all three fields
    pub fn view(&self) -> RecordView<'_> {
        self.spans.view(&self.lock)
    }

    /// Position of the record in storage order
    pub fn physical_index(&self) -> usize {
        self.lock.index()
    }

    /// Copy the record out of storage
    pub fn to_record(&self) -> LogRecord {
        self.view().to_record()
    }
}

impl std::fmt::Debug for LogRecordRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let view = self.view();
        f.debug_struct("LogRecordRef")
            .field("store", &self.handle.id())
            .field("index", &self.physical_index())
            .field("timestamp", &view.timestamp)
            .field("app_name", &view.app_name)
            .field("message", &view.message)
            .finish()
    }
}

/// Lazy iterator over the records of a store in timestamp order
///
/// Holds the store open read-only until it and every record it yielded are
/// dropped. Records that cannot be locked or decoded are skipped.
pub struct Records<'a> {
    handle: Option<Rc<StoreHandle<'a>>>,
    index: Vec<IndexEntry>,
    order: Order,
    // Unvisited range of `index`
    front: usize,
    back: usize,
}

impl<'a> Records<'a> {
    fn empty(order: Order) -> Self {
        Self {
            handle: None,
            index: Vec::new(),
            order,
            front: 0,
            back: 0,
        }
    }

    fn build(handle: StoreHandle<'a>, order: Order) -> Result<Self, LogDbError> {
        let count = handle.record_count()?;
        let mut index = reserve_index(count)?;

        for physical in 0..count {
            let lock = match handle.db().query_record(physical) {
                Ok(lock) => lock,
                Err(e) => {
                    debug!(physical, error = %e, "Skipping unreadable record");
                    continue;
                }
            };
            match codec::read_timestamp(&lock) {
                Ok(timestamp) => index.push(IndexEntry {
                    timestamp,
                    physical,
                }),
                Err(e) => debug!(physical, error = %e, "Skipping corrupt record"),
            }
        }

        // Stable: equal timestamps keep physical order
        index.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        trace!(indexed = index.len(), physical = count, "Built sort index");

        let back = index.len();
        Ok(Self {
            handle: Some(Rc::new(handle)),
            index,
            order,
            front: 0,
            back,
        })
    }

    /// Direction of the enumeration
    pub fn order(&self) -> Order {
        self.order
    }

    /// Number of records left to visit, before skipping corrupt ones
    pub fn remaining(&self) -> usize {
        self.back - self.front
    }

    /// Start the walk over from the beginning
    ///
    /// The index is reused; records appended since it was built are not seen.
    pub fn rewind(&mut self) {
        self.front = 0;
        self.back = self.index.len();
    }

    /// Stop the walk and let go of the store
    ///
    /// The store closes now, or when the last record still held from this
    /// iterator is dropped. The iterator yields nothing afterwards.
    pub fn close(&mut self) {
        self.handle = None;
        self.front = self.back;
    }

    fn load(&self, entry: IndexEntry) -> Option<LogRecordRef<'a>> {
        let handle = self.handle.as_ref()?;
        let lock = match handle.db().query_record(entry.physical) {
            Ok(lock) => lock,
            Err(e) => {
                debug!(physical = entry.physical, error = %e, "Skipping unreadable record");
                return None;
            }
        };
        match codec::decode_spans(&lock) {
            Ok(spans) => Some(LogRecordRef {
                lock,
                spans,
                handle: Rc::clone(handle),
            }),
            Err(e) => {
                debug!(physical = entry.physical, error = %e, "Skipping corrupt record");
                None
            }
        }
    }

    // The newest remaining entry
    fn next_newest(&mut self) -> Option<LogRecordRef<'a>> {
        while self.front < self.back {
            let entry = self.index[self.front];
            self.front += 1;
            if let Some(record) = self.load(entry) {
                return Some(record);
            }
        }
        None
    }

    // The oldest remaining entry
    fn next_oldest(&mut self) -> Option<LogRecordRef<'a>> {
        while self.front < self.back {
            self.back -= 1;
            let entry = self.index[self.back];
            if let Some(record) = self.load(entry) {
                return Some(record);
            }
        }
        None
    }
}

fn reserve_index(records: usize) -> Result<Vec<IndexEntry>, LogDbError> {
    let mut index = Vec::new();
    index
        .try_reserve_exact(records)
        .map_err(|_| LogDbError::IndexAllocationFailed { records })?;
    Ok(index)
}

impl<'a> Iterator for Records<'a> {
    type Item = LogRecordRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.order {
            Order::NewestFirst => self.next_newest(),
            Order::OldestFirst => self.next_oldest(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

impl DoubleEndedIterator for Records<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        match self.order {
            Order::NewestFirst => self.next_oldest(),
            Order::OldestFirst => self.next_newest(),
        }
    }
}

impl FusedIterator for Records<'_> {}

impl std::fmt::Debug for Records<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("order", &self.order)
            .field("indexed", &self.index.len())
            .field("remaining", &self.remaining())
            .finish()
    }
}

impl<S: RecordStorage, C: Clock> LogStore<S, C> {
    /// Iterate over all records in timestamp order
    ///
    /// A store that was never created yields nothing.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the store exists but cannot be opened, and
    /// [`LogDbError::IndexAllocationFailed`] if the sort index cannot be
    /// allocated, in which case nothing is visited.
    #[instrument(skip(self), fields(store = %self.config().name))]
    pub fn records(&self, order: Order) -> Result<Records<'_>, LogDbError> {
        match self.open_read_only()? {
            Some(handle) => Records::build(handle, order),
            None => Ok(Records::empty(order)),
        }
    }

    /// Visit records in timestamp order until `visitor` returns false
    ///
    /// Returns the number of records visited. Each record stays locked only
    /// for the duration of its visit.
    pub fn enumerate<F>(&self, order: Order, mut visitor: F) -> Result<usize, LogDbError>
    where
        F: FnMut(RecordView<'_>) -> bool,
    {
        let mut visited = 0;
        for record in self.records(order)? {
            visited += 1;
            if !visitor(record.view()) {
                break;
            }
        }
        Ok(visited)
    }

    /// Collect every record into owned values
    pub fn snapshot(&self, order: Order) -> Result<Vec<LogRecord>, LogDbError> {
        Ok(self.records(order)?.map(|r| r.to_record()).collect())
    }
}
