//! Stress tests for logdb-logging app context
//!
//! These tests focus on high-volume scenarios to verify that AppContextGuard
//! handles heavy switching and nesting across threads.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use logdb_logging::{AppContextData, AppContextGuard, LogConfig, LogDbSubscriberBuilder};

/// Test concurrent app context creation and switching across multiple threads
#[test]
fn test_concurrent_app_contexts() {
    const NUM_THREADS: usize = 50;
    const ITERATIONS: usize = 100;

    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let mut handles = vec![];

    let start = Instant::now();

    for thread_id in 0..NUM_THREADS {
        let barrier = Arc::clone(&barrier);

        let handle = thread::spawn(move || {
            let app_name = format!("App{thread_id}");

            // Wait for all threads to be ready
            barrier.wait();

            for _ in 0..ITERATIONS {
                let _guard = AppContextGuard::new(app_name.clone());
                assert_eq!(AppContextGuard::current_app_name(), Some(app_name.clone()));
            }

            // After all guards drop, context should be None
            assert!(AppContextGuard::current().is_none());
        });

        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    println!(
        "Completed {} app context operations across {} threads in {:?}",
        NUM_THREADS * ITERATIONS,
        NUM_THREADS,
        elapsed
    );
}

/// Test rapid context switching (10,000+ switches)
#[test]
fn test_rapid_context_switching() {
    const NUM_SWITCHES: usize = 10_000;

    let viewer = AppContextData::new("LogViewer");
    let writer = AppContextData::new("LogTestApp");

    let start = Instant::now();

    for i in 0..NUM_SWITCHES {
        let data = if i % 2 == 0 { &viewer } else { &writer };
        let _guard = AppContextGuard::enter(data.clone());

        let ctx = AppContextGuard::current().unwrap();
        assert_eq!(ctx, *data);
    }

    let elapsed = start.elapsed();
    println!("Completed {} context switches in {:?}", NUM_SWITCHES, elapsed);

    assert!(AppContextGuard::current().is_none());
}

/// Test nested app contexts with many levels
#[test]
fn test_nested_app_contexts() {
    const NESTING_DEPTH: usize = 100;

    let mut guards = Vec::new();
    for i in 0..NESTING_DEPTH {
        guards.push(AppContextGuard::new(format!("App{i}")));
        assert_eq!(AppContextGuard::current_app_name(), Some(format!("App{i}")));
    }

    // Drop guards in reverse order and verify context restoration
    for i in (0..NESTING_DEPTH).rev() {
        guards.pop();

        if i > 0 {
            assert_eq!(
                AppContextGuard::current_app_name(),
                Some(format!("App{}", i - 1))
            );
        } else {
            assert!(AppContextGuard::current().is_none());
        }
    }
}

/// Test that many sessions of one app get unique ids
#[test]
fn test_session_ids_unique() {
    const NUM_SESSIONS: usize = 10_000;

    let mut ids: Vec<_> = (0..NUM_SESSIONS)
        .map(|_| AppContextData::new("LogTestApp").session_id)
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), NUM_SESSIONS, "Found duplicate session ids");
}

/// Test that the testing preset installs once and refuses a second subscriber
#[test]
fn test_init_testing_twice() {
    logdb_logging::init_testing();
    logdb_logging::init_testing();

    let second = LogDbSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
    assert!(second.is_err());
}
