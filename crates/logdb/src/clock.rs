//! Timestamps
//!
//! Log timestamps count seconds since midnight, January 1 1904, local time,
//! the handheld's epoch. They are not Unix timestamps.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Local, NaiveDateTime};

/// Seconds from the handheld epoch to the Unix epoch
pub const EPOCH_OFFSET_SECS: i64 = 2_082_844_800;

/// Time abstraction for testability
pub trait Clock: Send + Sync {
    /// Current time in seconds since the handheld epoch
    fn now_seconds(&self) -> u32;
}

/// Real clock implementation using the local wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_seconds(&self) -> u32 {
        seconds_from_datetime(Local::now().naive_local())
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    seconds: AtomicU32,
}

impl ManualClock {
    /// Create a clock reading `seconds`
    pub fn new(seconds: u32) -> Self {
        Self {
            seconds: AtomicU32::new(seconds),
        }
    }

    /// Set the current time
    pub fn set(&self, seconds: u32) {
        self.seconds.store(seconds, Ordering::SeqCst);
    }

    /// Move the clock forward
    pub fn advance(&self, seconds: u32) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_seconds(&self) -> u32 {
        self.seconds.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_seconds(&self) -> u32 {
        (**self).now_seconds()
    }
}

/// Convert a calendar time to handheld seconds, clamped to the u32 range
pub fn seconds_from_datetime(datetime: NaiveDateTime) -> u32 {
    let secs = datetime.and_utc().timestamp() + EPOCH_OFFSET_SECS;
    secs.clamp(0, i64::from(u32::MAX)) as u32
}

/// Convert handheld seconds to a calendar time
pub fn to_datetime(timestamp: u32) -> NaiveDateTime {
    DateTime::from_timestamp(i64::from(timestamp) - EPOCH_OFFSET_SECS, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

/// Format a timestamp as `YYYY-MM-DD HH:MM`
pub fn format_timestamp(timestamp: u32) -> String {
    to_datetime(timestamp).format("%Y-%m-%d %H:%M").to_string()
}
