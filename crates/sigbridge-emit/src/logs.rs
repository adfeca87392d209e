//! Signal-to-log-record translation
//!
//! A whitelist filter decides which signals become structured log records;
//! an empty whitelist admits everything. The record body is the
//! JSON-serialized event, with one attribute per event field.

use sigbridge_core::config::LogSettings;
use sigbridge_core::signal::SignalEvent;
use sigbridge_core::sinks::{LogRecordData, LogSink};
use std::collections::HashSet;
use std::sync::Arc;

/// Emits log records for whitelisted signals
pub struct LogMapper {
    enabled: bool,
    /// `None` admits every signal
    whitelist: Option<HashSet<String>>,
    sink: Arc<dyn LogSink>,
}

impl LogMapper {
    pub fn new(settings: &LogSettings, sink: Arc<dyn LogSink>) -> Self {
        let whitelist = if settings.signals.is_empty() {
            None
        } else {
            Some(settings.signals.iter().cloned().collect())
        };
        Self {
            enabled: settings.enabled,
            whitelist,
            sink,
        }
    }

    /// Whether this signal passes the whitelist filter
    pub fn admits(&self, signal: &str) -> bool {
        self.enabled
            && self
                .whitelist
                .as_ref()
                .map(|w| w.contains(signal))
                .unwrap_or(true)
    }

    /// Emit a log record for the event if its signal is admitted
    pub fn handle_event(&self, event: &SignalEvent) {
        if !self.admits(&event.signal.name) {
            return;
        }

        let body = serde_json::to_string(event).unwrap_or_default();
        self.sink.emit(LogRecordData {
            timestamp: event.timestamp,
            severity: event.severity,
            signal: event.signal.name.clone(),
            body,
            attributes: event.fields.clone(),
        });
    }
}
