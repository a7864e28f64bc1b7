//! # LogDB
//!
//! Append-only, timestamped log record store shared by every app on a
//! device.
//!
//! Apps append small `(timestamp, app name, message)` records to one shared
//! store; viewers read them back newest first or oldest first. The store is
//! located by a fixed `(name, type, creator)` identity, so any process using
//! the same [`StoreConfig`] sees the same records.
//!
//! ## Features
//!
//! - **LogStore**: Append, enumerate and clear over any [`RecordStorage`]
//! - **Records**: Lazy, double-ended iteration in timestamp order
//! - **LogSession**: Per-app writer that keeps the store open
//! - **View helpers**: App lists, time windows and text rendering for viewers
//!
//! ## Example
//!
//! ```rust
//! use logdb::{LogStore, ManualClock, Order};
//! use logdb_storage::InMemoryStorage;
//!
//! let store = LogStore::new(InMemoryStorage::new()).with_clock(ManualClock::new(100));
//! store.append(Some("AppA"), Some("hello")).unwrap();
//! store.clock().set(200);
//! store.append(Some("AppB"), Some("world")).unwrap();
//!
//! let mut seen = Vec::new();
//! store
//!     .enumerate(Order::NewestFirst, |record| {
//!         seen.push(record.message.to_string());
//!         true
//!     })
//!     .unwrap();
//! assert_eq!(seen, ["world", "hello"]);
//! ```
//!
//! [`RecordStorage`]: logdb_storage::RecordStorage

pub mod clock;
pub mod codec;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod session;
pub mod store;
pub mod view;

// Re-exports
pub use clock::{Clock, EPOCH_OFFSET_SECS, ManualClock, SystemClock, format_timestamp, to_datetime};
pub use codec::{CodecError, LogRecord, RecordView};
pub use config::{StoreConfig, UNKNOWN_APP};
pub use enumerate::{LogRecordRef, Order, Records};
pub use error::{LogDbError, OpenStage};
pub use session::LogSession;
pub use store::{LogStore, StoreHandle};
pub use view::{MAX_APP_CHOICES, TimeWindow, ViewFilter, distinct_app_names, render};
