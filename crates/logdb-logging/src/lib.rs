//! Tracing setup for LogDB applications
//!
//! This crate installs the `tracing` subscriber used by apps that write to
//! the log store, and tags spans with the app that opened them.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines format for log aggregation (default)
//! - **App Context Injection**: Spans opened inside an app session carry its name
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//!
//! # Quick Start
//!
//! ```ignore
//! use logdb_logging::{LogConfig, LogDbSubscriberBuilder};
//!
//! // Simple setup with defaults (JSONL to console)
//! LogDbSubscriberBuilder::new().init();
//!
//! // Development mode with pretty human-readable output
//! LogDbSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! # App Context
//!
//! Use [`AppContextGuard`] to set the app for a scope:
//!
//! ```ignore
//! use logdb_logging::AppContextGuard;
//!
//! let _guard = AppContextGuard::new("LogTestApp");
//!
//! // Spans opened in this scope carry app_name = "LogTestApp"
//! tracing::info_span!("append").in_scope(|| tracing::info!("Appended"));
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod layers;

pub use config::{
    ConsoleConfig, FileConfig, FilterConfig, JsonlConfig, LogConfig, RotationStrategy,
};
pub use context::{AppContextData, AppContextGuard};
pub use error::LoggingError;
pub use layers::{AppContextExtension, AppContextLayer, jsonl_layer};

use std::fs::{self, File};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Builder for configuring and initializing the LogDB logging subscriber
///
/// By default, console output uses JSONL format. Use `LogConfig::development()`
/// for human-readable pretty output during development.
#[derive(Debug, Clone, Default)]
pub struct LogDbSubscriberBuilder {
    config: LogConfig,
}

impl LogDbSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// The configuration that will be installed
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(self.config.directives())?),
        }
    }

    /// Initialize the subscriber globally
    ///
    /// Returns a guard that must be kept alive for the duration of the
    /// program when file output is enabled. Setup failures are reported on
    /// stderr and leave logging uninstalled.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }

    /// Try to initialize the subscriber globally
    ///
    /// Returns an error if a global subscriber has already been set or the
    /// log file cannot be opened.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = self.env_filter()?;
        let registry = Registry::default()
            .with(env_filter)
            .with(AppContextLayer::new());

        let console = &self.config.console;
        let jsonl = &self.config.jsonl;

        // Separate arms for pretty vs JSONL console to satisfy the type system
        match (console.enabled, console.pretty, self.config.file.as_ref()) {
            // Pretty console + File
            (true, true, Some(file_config)) => {
                let (writer, guard) = file_writer(file_config)?;
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true);
                registry
                    .with(console_layer)
                    .with(jsonl_layer(writer, jsonl))
                    .try_init()?;
                Ok(Some(guard))
            }

            // JSONL console + File
            (true, false, Some(file_config)) => {
                let (writer, guard) = file_writer(file_config)?;
                registry
                    .with(jsonl_layer(std::io::stdout, jsonl))
                    .with(jsonl_layer(writer, jsonl))
                    .try_init()?;
                Ok(Some(guard))
            }

            // Pretty console only
            (true, true, None) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true);
                registry.with(console_layer).try_init()?;
                Ok(None)
            }

            // JSONL console only (DEFAULT)
            (true, false, None) => {
                registry.with(jsonl_layer(std::io::stdout, jsonl)).try_init()?;
                Ok(None)
            }

            // File only (no console)
            (false, _, Some(file_config)) => {
                let (writer, guard) = file_writer(file_config)?;
                registry.with(jsonl_layer(writer, jsonl)).try_init()?;
                Ok(Some(guard))
            }

            // Nothing enabled - just base registry
            (false, _, None) => {
                registry.try_init()?;
                Ok(None)
            }
        }
    }
}

/// Open the non-blocking writer for file output
///
/// `Never` truncates a single file; the other strategies append to rolling files.
pub fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&config.directory)?;
            let path = config.directory.join(format!("{}.log", config.prefix));
            let file = File::create(&path)?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.as_str())
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() {
    LogDbSubscriberBuilder::new().init();
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() {
    LogDbSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Initialize logging for testing (minimal output)
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_testing() {
    let _ = LogDbSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
