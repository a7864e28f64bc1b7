//! Integration tests for the log store
//!
//! These tests drive the public API end to end: append visibility, ordering
//! and tie-breaking, empty and cleared stores, early stop, and sharing one
//! store between independent storage instances.

use std::sync::Arc;

use logdb::{
    Clock, LogDbError, LogRecord, LogSession, LogStore, ManualClock, Order, StoreConfig, TimeWindow,
    ViewFilter, codec, distinct_app_names, render,
};
use logdb_storage::{FileStorage, InMemoryStorage, OpenMode, RecordStorage, StorageError};
use tempfile::TempDir;

fn memory_store(now: u32) -> LogStore<InMemoryStorage, ManualClock> {
    logdb_logging::init_testing();
    LogStore::new(InMemoryStorage::new()).with_clock(ManualClock::new(now))
}

fn collect<S: RecordStorage, C: Clock>(store: &LogStore<S, C>, order: Order) -> Vec<LogRecord> {
    let mut out = Vec::new();
    store
        .enumerate(order, |record| {
            out.push(record.to_record());
            true
        })
        .unwrap();
    out
}

fn record(timestamp: u32, app_name: &str, message: &str) -> LogRecord {
    LogRecord {
        timestamp,
        app_name: app_name.to_string(),
        message: message.to_string(),
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// Records with equal timestamps keep insertion order newest-first
#[test]
fn test_tied_records_keep_insertion_order() {
    let store = memory_store(100);
    store.append(Some("AppA"), Some("hello")).unwrap();
    store.clock().set(200);
    store.append(Some("AppB"), Some("world")).unwrap();
    store.clock().set(100);
    store.append(Some("AppA"), Some("again")).unwrap();

    assert_eq!(
        collect(&store, Order::NewestFirst),
        [
            record(200, "AppB", "world"),
            record(100, "AppA", "hello"),
            record(100, "AppA", "again"),
        ]
    );
}

/// Oldest-first is exactly newest-first reversed, ties included
#[test]
fn test_order_symmetry() {
    let store = memory_store(0);
    for (i, ts) in [5, 3, 5, 1, 3, 5, 9, 1].into_iter().enumerate() {
        store.clock().set(ts);
        store.append(Some("App"), Some(&format!("m{i}"))).unwrap();
    }

    let newest = collect(&store, Order::NewestFirst);
    let mut oldest = collect(&store, Order::OldestFirst);
    oldest.reverse();
    assert_eq!(newest, oldest);

    let timestamps: Vec<_> = newest.iter().map(|r| r.timestamp).collect();
    assert_eq!(timestamps, [9, 5, 5, 5, 3, 3, 1, 1]);
    let fives: Vec<_> = newest
        .iter()
        .filter(|r| r.timestamp == 5)
        .map(|r| r.message.as_str())
        .collect();
    assert_eq!(fives, ["m0", "m2", "m5"]);
}

/// A record appended with the newest timestamp is visited first
#[test]
fn test_append_visible_first() {
    let store = memory_store(1_000);
    store.append(Some("Older"), Some("x")).unwrap();
    store.clock().advance(1);
    let ts = store.append(Some("LogTestApp"), Some("Test log message")).unwrap();

    let first = store.records(Order::NewestFirst).unwrap().next().unwrap();
    assert_eq!(first.timestamp(), ts);
    assert_eq!(first.app_name(), "LogTestApp");
    assert_eq!(first.message(), "Test log message");
}

/// Real clock timestamps land close to the time of the call
#[test]
fn test_append_with_system_clock() {
    let store = LogStore::new(InMemoryStorage::new());
    let before = logdb::clock::seconds_from_datetime(chrono::Local::now().naive_local());
    let ts = store.append(Some("App"), Some("now")).unwrap();
    assert!(ts >= before && ts - before <= 5);
}

// ============================================================================
// Empty, clear and early stop
// ============================================================================

/// Enumerating a store that was never created visits nothing
#[test]
fn test_enumerate_missing_store() {
    let store = memory_store(0);
    let mut visits = 0;
    let visited = store
        .enumerate(Order::NewestFirst, |_| {
            visits += 1;
            true
        })
        .unwrap();
    assert_eq!((visited, visits), (0, 0));
    assert!(store.open_read_only().unwrap().is_none());
}

/// Clearing twice leaves the store empty both times
#[test]
fn test_clear_idempotent() {
    let store = memory_store(10);
    for i in 0..20 {
        store.append(Some("App"), Some(&i.to_string())).unwrap();
    }

    for _ in 0..2 {
        store.clear().unwrap();
        assert_eq!(store.enumerate(Order::NewestFirst, |_| true).unwrap(), 0);
    }
}

/// Clearing a store that was never created creates it empty
#[test]
fn test_clear_missing_store() {
    let store = memory_store(0);
    assert_eq!(store.clear().unwrap(), 0);
    assert!(store.open_read_only().unwrap().is_some());
}

/// The visitor can stop the walk after any record
#[test]
fn test_visitor_short_circuit() {
    let store = memory_store(0);
    for ts in 1..=10 {
        store.clock().set(ts);
        store.append(Some("App"), Some("x")).unwrap();
    }

    for k in 1..=10 {
        let mut calls = 0;
        let visited = store
            .enumerate(Order::OldestFirst, |_| {
                calls += 1;
                calls < k
            })
            .unwrap();
        assert_eq!(calls, k);
        assert_eq!(visited, k);
    }
}

/// Iterator adaptors bound the walk the same way
#[test]
fn test_records_take() {
    let store = memory_store(0);
    for ts in 1..=5 {
        store.clock().set(ts);
        store.append(Some("App"), Some("x")).unwrap();
    }

    let latest: Vec<_> = store
        .records(Order::NewestFirst)
        .unwrap()
        .take(2)
        .map(|r| r.timestamp())
        .collect();
    assert_eq!(latest, [5, 4]);
}

// ============================================================================
// Failure handling
// ============================================================================

/// Oversized input is rejected before the store is created
#[test]
fn test_oversized_append_rejected() {
    let store = memory_store(0);
    let huge = "x".repeat(70_000);
    let err = store.append(Some("App"), Some(&huge)).unwrap_err();
    assert!(matches!(err, LogDbError::RecordTooLarge { max: 65_535, .. }));
    assert!(store.open_read_only().unwrap().is_none());
}

/// A failed append leaves no record behind
#[test]
fn test_failed_append_leaves_nothing() {
    let quota = logdb_storage::StorageQuota::builder()
        .max_total_bytes(64)
        .build();
    let store =
        LogStore::new(InMemoryStorage::with_quota(quota)).with_clock(ManualClock::new(1));

    let mut appended = 0;
    let err = loop {
        match store.append(Some("App"), Some("twenty byte message")) {
            Ok(_) => appended += 1,
            Err(e) => break e,
        }
    };
    assert!(matches!(
        err,
        LogDbError::AllocationFailed(StorageError::CapacityExceeded)
    ));
    assert_eq!(store.record_count().unwrap(), appended);
    assert_eq!(collect(&store, Order::NewestFirst).len(), appended);
}

/// Corrupt records are skipped, the rest still enumerate in order
#[test]
fn test_corrupt_records_skipped() {
    let store = memory_store(50);
    store.append(Some("App"), Some("before")).unwrap();

    let id = store.open_or_create().unwrap().id();
    {
        let mut db = store.storage().open_database(id, OpenMode::ReadWrite).unwrap();
        let mut bad = 60u32.to_be_bytes().to_vec();
        bad.extend_from_slice(b"NoTerminator");
        let index = db.new_record(bad.len()).unwrap();
        db.write_record(index, 0, &bad).unwrap();
        db.release_record(index, true).unwrap();
    }

    store.clock().set(70);
    store.append(Some("App"), Some("after")).unwrap();

    let messages: Vec<_> = collect(&store, Order::NewestFirst)
        .into_iter()
        .map(|r| r.message)
        .collect();
    assert_eq!(messages, ["after", "before"]);
    assert_eq!(store.record_count().unwrap(), 3);
}

/// Records being written are not visible to readers
#[test]
fn test_busy_record_invisible() {
    let store = memory_store(5);
    store.append(Some("App"), Some("done")).unwrap();

    let id = store.open_or_create().unwrap().id();
    let mut writer = store.storage().open_database(id, OpenMode::ReadWrite).unwrap();
    let bytes = codec::encode(9, "App", "in progress");
    let index = writer.new_record(bytes.len()).unwrap();
    writer.write_record(index, 0, &bytes).unwrap();

    assert_eq!(collect(&store, Order::NewestFirst), [record(5, "App", "done")]);

    writer.release_record(index, true).unwrap();
    assert_eq!(collect(&store, Order::NewestFirst).len(), 2);
}

/// Every lock and open taken by enumeration is released
#[test]
fn test_enumeration_releases_everything() {
    let store = memory_store(0);
    for ts in 0..50 {
        store.clock().set(ts);
        store.append(Some("App"), Some("x")).unwrap();
    }
    let id = store.open_or_create().unwrap().id();

    store.enumerate(Order::NewestFirst, |r| r.timestamp > 25).unwrap();
    drop(store.records(Order::OldestFirst).unwrap());
    let _ = store.snapshot(Order::NewestFirst).unwrap();

    for index in 0..50 {
        assert_eq!(store.storage().lock_count(id, index).unwrap(), 0);
    }
    assert_eq!(store.storage().open_count(id), 0);
}

// ============================================================================
// Sharing
// ============================================================================

/// Stores with the same identity over one storage share records
#[test]
fn test_shared_identity() {
    let storage = InMemoryStorage::new();
    let clock = Arc::new(ManualClock::new(10));
    let writer = LogStore::new(storage.clone()).with_clock(clock.clone());
    let reader = LogStore::new(storage.clone()).with_clock(clock.clone());
    let other = LogStore::with_config(storage, StoreConfig::shared_logger()).with_clock(clock);

    writer.append(Some("Writer"), Some("shared")).unwrap();
    assert_eq!(reader.snapshot(Order::NewestFirst).unwrap().len(), 1);
    assert!(other.snapshot(Order::NewestFirst).unwrap().is_empty());

    other.append(Some("Other"), Some("separate")).unwrap();
    assert_eq!(reader.record_count().unwrap(), 1);
    assert_eq!(other.record_count().unwrap(), 1);
}

/// Two file storages on one directory see each other's appends
#[test]
fn test_file_storage_shared_between_instances() {
    let dir = TempDir::new().unwrap();
    let writer = LogStore::new(FileStorage::new(dir.path()).unwrap())
        .with_clock(ManualClock::new(100));
    let reader = LogStore::new(FileStorage::new(dir.path()).unwrap())
        .with_clock(ManualClock::new(0));

    assert!(reader.open_read_only().unwrap().is_none());

    writer.append(Some("AppA"), Some("hello")).unwrap();
    writer.clock().set(200);
    writer.append(Some("AppB"), Some("world")).unwrap();

    assert_eq!(
        collect(&reader, Order::NewestFirst),
        [record(200, "AppB", "world"), record(100, "AppA", "hello")]
    );

    reader.clear().unwrap();
    assert_eq!(writer.record_count().unwrap(), 0);
}

/// Records survive reopening the directory
#[test]
fn test_file_storage_persists() {
    let dir = TempDir::new().unwrap();
    {
        let store = LogStore::new(FileStorage::new(dir.path()).unwrap())
            .with_clock(ManualClock::new(42));
        let mut session = LogSession::open(&store, "HelloApp").unwrap();
        session.log("MainSubmitButton Clicked").unwrap();
    }

    let store =
        LogStore::new(FileStorage::new(dir.path()).unwrap()).with_clock(ManualClock::new(0));
    assert_eq!(
        collect(&store, Order::NewestFirst),
        [record(42, "HelloApp", "MainSubmitButton Clicked")]
    );

    let id = store.open_or_create().unwrap().id();
    let info = store.storage().database_info(id).unwrap();
    assert!(info.header.attributes.backup);
}

/// An append that cannot reach the disk leaves no record behind
#[test]
fn test_file_append_failure_leaves_nothing() {
    let dir = TempDir::new().unwrap();
    let store =
        LogStore::new(FileStorage::new(dir.path()).unwrap()).with_clock(ManualClock::new(5));
    let id = store.open_or_create().unwrap().id();
    // A directory where the image's temp file goes fails every write
    let blocker = dir.path().join(format!("{}.pdb.tmp", id.to_hex()));

    let mut session = LogSession::open(&store, "LogTestApp").unwrap();
    std::fs::create_dir(&blocker).unwrap();
    let err = session.log("a").unwrap_err();
    assert!(matches!(err, LogDbError::AttachFailed(StorageError::Io(_))));

    std::fs::remove_dir(&blocker).unwrap();
    session.log("b").unwrap();
    session.close();

    assert_eq!(store.record_count().unwrap(), 1);
    assert_eq!(
        collect(&store, Order::NewestFirst),
        [record(5, "LogTestApp", "b")]
    );
    assert_eq!(store.clear().unwrap(), 1);
}

// ============================================================================
// Viewer
// ============================================================================

/// The viewer flow: app list, filter, render
#[test]
fn test_viewer_flow() {
    let store = memory_store(0);
    let day = 24 * 60 * 60;
    let now = 3_000_000_000;
    for (ts, app, msg) in [
        (now - 3 * day, "HelloApp", "started"),
        (now - 600, "LogTestApp", "Test log message"),
        (now - 60, "HelloApp", "clicked"),
    ] {
        store.clock().set(ts);
        store.append(Some(app), Some(msg)).unwrap();
    }

    assert_eq!(
        distinct_app_names(&store, logdb::MAX_APP_CHOICES).unwrap(),
        ["HelloApp", "LogTestApp"]
    );

    let filter = ViewFilter::all().for_app("HelloApp").within(TimeWindow::Last24Hours);
    let text = render(&store, &filter, now).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.ends_with(" - HelloApp - clicked\n"));

    let everything = render(&store, &ViewFilter::all(), now).unwrap();
    assert_eq!(everything.lines().count(), 3);
    assert!(everything.lines().last().unwrap().ends_with("started"));
}
