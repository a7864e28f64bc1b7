//! Custom tracing layers for LogDB
//!
//! This module provides the layer that attaches the active app context to
//! spans, and the JSONL formatter shared by console and file output.

use tracing::{Subscriber, span};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::config::JsonlConfig;
use crate::context::{AppContextData, AppContextGuard};

/// Layer that records the app context on spans
///
/// Every span opened while an [`AppContextGuard`] is active carries an
/// [`AppContextExtension`] with the app name and session id.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppContextLayer;

impl AppContextLayer {
    /// Create a new app context layer
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct AppContextExtension {
    pub data: AppContextData,
}

impl<S> Layer<S> for AppContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            // If there's an active app context, attach it to the span
            if let Some(app_ctx) = AppContextGuard::current() {
                span.extensions_mut()
                    .insert(AppContextExtension { data: app_ctx });
            }
        }
    }
}

/// Create a JSONL formatting layer writing to `writer`
pub fn jsonl_layer<S, W>(
    writer: W,
    config: &JsonlConfig,
) -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(config.include_current_span)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info)
        .with_writer(writer)
}
