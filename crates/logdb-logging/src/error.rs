//! Error types for logging setup

use thiserror::Error;

/// Errors that can occur while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Log file or directory could not be created
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rolling file appender could not be created
    #[error("File appender error: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    /// Filter directives did not parse
    #[error("Invalid filter directives: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// A global subscriber is already installed
    #[error("Subscriber already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}
