//! App context injection
//!
//! Thread-local storage for the name of the app writing logs, so every span
//! opened while an app is active can be attributed to it.

use std::cell::RefCell;

use uuid::Uuid;

/// App context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppContextData {
    /// Name the app logs under
    pub app_name: String,
    /// Unique id of this app session
    pub session_id: Uuid,
}

impl AppContextData {
    /// Context for a new session of `app_name`
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            session_id: Uuid::new_v4(),
        }
    }
}

thread_local! {
    static APP_CONTEXT: RefCell<Option<AppContextData>> = const { RefCell::new(None) };
}

/// RAII guard for app context
///
/// Creating the guard sets the app context for the current thread; dropping
/// it restores the previous context (if any).
///
/// # Example
///
/// ```rust
/// use logdb_logging::AppContextGuard;
///
/// {
///     let _guard = AppContextGuard::new("LogTestApp");
///     assert_eq!(AppContextGuard::current_app_name().as_deref(), Some("LogTestApp"));
/// }
/// assert!(AppContextGuard::current().is_none());
/// ```
pub struct AppContextGuard {
    previous: Option<AppContextData>,
}

impl AppContextGuard {
    /// Enter a fresh session context for `app_name`
    pub fn new(app_name: impl Into<String>) -> Self {
        Self::enter(AppContextData::new(app_name))
    }

    /// Enter an existing context, keeping its session id
    pub fn enter(data: AppContextData) -> Self {
        let previous = APP_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Get the current app context (if any)
    pub fn current() -> Option<AppContextData> {
        APP_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current app name (if set)
    pub fn current_app_name() -> Option<String> {
        Self::current().map(|ctx| ctx.app_name)
    }

    /// Get the current session id (if set)
    pub fn current_session_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.session_id)
    }
}

impl Drop for AppContextGuard {
    fn drop(&mut self) {
        APP_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with an app context set
///
/// # Example
///
/// ```rust
/// use logdb_logging::with_app_context;
///
/// let name = with_app_context!("Viewer", {
///     logdb_logging::AppContextGuard::current_app_name()
/// });
/// assert_eq!(name.as_deref(), Some("Viewer"));
/// ```
#[macro_export]
macro_rules! with_app_context {
    ($app_name:expr, $body:block) => {{
        let _guard = $crate::context::AppContextGuard::new($app_name);
        $body
    }};
}
