//! Viewer helpers
//!
//! Filtering and rendering a log viewer builds on top of enumeration: a list
//! of the apps that have logged, and a newest-first text dump restricted to
//! one app and a time window.

use std::collections::HashSet;

use logdb_storage::RecordStorage;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, format_timestamp, to_datetime};
use crate::codec::RecordView;
use crate::enumerate::Order;
use crate::error::LogDbError;
use crate::store::LogStore;

/// Most app names offered for filtering
pub const MAX_APP_CHOICES: usize = 32;

const HOUR: u32 = 60 * 60;
const DAY: u32 = 24 * HOUR;

/// Time range a viewer shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeWindow {
    #[default]
    All,
    LastHour,
    Last24Hours,
    Last7Days,
    /// Same calendar day as now
    Today,
}

impl TimeWindow {
    /// Every window, in menu order
    pub const ALL: [TimeWindow; 5] = [
        TimeWindow::All,
        TimeWindow::LastHour,
        TimeWindow::Last24Hours,
        TimeWindow::Last7Days,
        TimeWindow::Today,
    ];

    /// Menu label
    pub fn label(self) -> &'static str {
        match self {
            TimeWindow::All => "All",
            TimeWindow::LastHour => "Last Hour",
            TimeWindow::Last24Hours => "Last 24h",
            TimeWindow::Last7Days => "Last 7d",
            TimeWindow::Today => "Today",
        }
    }

    /// Length of a relative window in seconds
    pub fn span_seconds(self) -> Option<u32> {
        match self {
            TimeWindow::LastHour => Some(HOUR),
            TimeWindow::Last24Hours => Some(DAY),
            TimeWindow::Last7Days => Some(7 * DAY),
            TimeWindow::All | TimeWindow::Today => None,
        }
    }

    /// Whether a record stamped `timestamp` falls in the window at `now`
    ///
    /// Records dated after `now` are outside every relative window.
    pub fn contains(self, now: u32, timestamp: u32) -> bool {
        match self {
            TimeWindow::All => true,
            TimeWindow::Today => to_datetime(now).date() == to_datetime(timestamp).date(),
            relative => match (relative.span_seconds(), now.checked_sub(timestamp)) {
                (Some(span), Some(age)) => age <= span,
                _ => false,
            },
        }
    }
}

/// Which records a viewer shows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewFilter {
    /// Only this app, or every app if `None`
    pub app: Option<String>,
    pub window: TimeWindow,
}

impl ViewFilter {
    /// Show every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one app
    pub fn for_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Restrict to a time window
    pub fn within(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn matches(&self, now: u32, record: &RecordView<'_>) -> bool {
        let app_ok = self.app.as_deref().is_none_or(|app| app == record.app_name);
        app_ok && self.window.contains(now, record.timestamp)
    }
}

/// Distinct app names in the order they first logged, at most `limit`
pub fn distinct_app_names<S, C>(
    store: &LogStore<S, C>,
    limit: usize,
) -> Result<Vec<String>, LogDbError>
where
    S: RecordStorage,
    C: Clock,
{
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for record in store.records(Order::OldestFirst)? {
        if names.len() >= limit {
            break;
        }
        if seen.insert(record.app_name().to_string()) {
            names.push(record.app_name().to_string());
        }
    }
    Ok(names)
}

/// One viewer line: `YYYY-MM-DD HH:MM - App - Message`
pub fn format_line(record: &RecordView<'_>) -> String {
    format!(
        "{} - {} - {}",
        format_timestamp(record.timestamp),
        record.app_name,
        record.message
    )
}

/// Render the records passing `filter` as newline-terminated lines, newest first
pub fn render<S, C>(
    store: &LogStore<S, C>,
    filter: &ViewFilter,
    now: u32,
) -> Result<String, LogDbError>
where
    S: RecordStorage,
    C: Clock,
{
    let mut out = String::new();
    for record in store.records(Order::NewestFirst)? {
        let view = record.view();
        if filter.matches(now, &view) {
            out.push_str(&format_line(&view));
            out.push('\n');
        }
    }
    Ok(out)
}
