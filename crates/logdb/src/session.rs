//! App logging sessions
//!
//! A [`LogSession`] is what an app holds for its lifetime: it binds the app
//! name once and keeps the store open for writing between log calls, so a
//! chatty app does not pay for an open and close on every line.

use logdb_logging::{AppContextData, AppContextGuard};
use logdb_storage::RecordStorage;
use tracing::{debug, debug_span};

use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::config::UNKNOWN_APP;
use crate::error::LogDbError;
use crate::store::{LogStore, StoreHandle, until_nul};

/// An app's open connection to the log store
///
/// The store stays open until [`LogSession::close`] or drop.
///
/// # Example
///
/// ```rust
/// use logdb::{LogSession, LogStore};
/// use logdb_storage::InMemoryStorage;
///
/// let store = LogStore::new(InMemoryStorage::new());
/// let mut session = LogSession::open(&store, "HelloApp").unwrap();
/// session.log("MainSubmitButton clicked").unwrap();
/// session.close();
///
/// assert_eq!(store.record_count().unwrap(), 1);
/// ```
pub struct LogSession<'s, S, C = SystemClock> {
    store: &'s LogStore<S, C>,
    context: AppContextData,
    handle: Option<StoreHandle<'s>>,
}

impl<'s, S: RecordStorage, C: Clock> LogSession<'s, S, C> {
    /// Start a session for `app_name`, opening (or creating) the store
    ///
    /// The name ends at its first NUL and is truncated to the configured
    /// length on a character boundary. An empty name logs as `UnknownApp`.
    pub fn open(store: &'s LogStore<S, C>, app_name: &str) -> Result<Self, LogDbError> {
        let app_name = truncate(until_nul(app_name), store.config().max_app_name_len);
        let app_name = if app_name.is_empty() {
            UNKNOWN_APP
        } else {
            app_name
        };

        let mut session = Self {
            store,
            context: AppContextData::new(app_name),
            handle: None,
        };
        session.ensure_open()?;
        debug!(
            app = %session.context.app_name,
            session = %session.context.session_id,
            "Opened log session"
        );
        Ok(session)
    }

    /// Name every record of this session is logged under
    pub fn app_name(&self) -> &str {
        &self.context.app_name
    }

    /// Logging context of this session
    pub fn context(&self) -> &AppContextData {
        &self.context
    }

    /// Whether the store is currently held open
    pub fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(StoreHandle::is_open)
    }

    fn ensure_open(&mut self) -> Result<&mut StoreHandle<'s>, LogDbError> {
        let handle = match self.handle.take() {
            Some(handle) if handle.is_open() => handle,
            _ => self.store.open_or_create()?,
        };
        Ok(self.handle.insert(handle))
    }

    /// Append one message stamped with the current time
    ///
    /// Reopens the store if the session was closed. Returns the timestamp
    /// that was written.
    pub fn log(&mut self, message: &str) -> Result<u32, LogDbError> {
        let _context = AppContextGuard::enter(self.context.clone());
        let span = debug_span!("log_session", app = %self.context.app_name);
        let _enter = span.enter();

        let message = until_nul(message);
        let size = codec::encoded_len(&self.context.app_name, message);
        let max = self.store.config().max_record_size;
        if size > max {
            return Err(LogDbError::RecordTooLarge { size, max });
        }

        let timestamp = self.store.clock().now_seconds();
        let app_name = self.context.app_name.clone();
        let index = self
            .ensure_open()?
            .append_record(timestamp, &app_name, message)?;
        debug!(index, timestamp, "Logged message");
        Ok(timestamp)
    }

    /// Remove every record, keeping the session open
    pub fn clear(&mut self) -> Result<usize, LogDbError> {
        let _context = AppContextGuard::enter(self.context.clone());
        self.ensure_open()?.drain()
    }

    /// Close the store. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
            debug!(app = %self.context.app_name, "Closed log session");
        }
    }
}

impl<S, C> std::fmt::Debug for LogSession<'_, S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSession")
            .field("app_name", &self.context.app_name)
            .field("session_id", &self.context.session_id)
            .field("open", &self.handle.as_ref().is_some_and(StoreHandle::is_open))
            .finish()
    }
}

/// Longest prefix of `s` within `max` bytes that ends on a char boundary
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
