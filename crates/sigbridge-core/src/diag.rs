//! Bridge self-diagnostics
//!
//! Fire-and-forget emissions describing anomalies in the bridge's own
//! operation (missing correlation field, expired pending match). Nothing in
//! the bridge returns an error to the event bus; this channel is the only
//! failure signal, and it is optional - without a sink, matching still
//! functions.

use crate::signal::{Field, FieldValue};
use serde::Serialize;
use tracing::warn;

/// Diagnostic identity for an event lacking its correlation field
pub const DIAG_CORRELATION_MISSING: &str = "correlation-missing";

/// Diagnostic identity for an evicted pending match
pub const DIAG_EXPIRED: &str = "expired";

/// Diagnostic identity for a metric event lacking a usable measurement
pub const DIAG_METRIC_VALUE_MISSING: &str = "metric-value-missing";

/// One diagnostic emission
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Diagnostic identity (e.g., "correlation-missing")
    pub name: &'static str,

    /// Key/value detail fields
    pub fields: Vec<Field>,
}

impl Diagnostic {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push(Field::new(key, value.into()));
        self
    }

    /// Look up a detail field value by key
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }
}

/// Receives bridge diagnostics, fire-and-forget
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diag: Diagnostic);
}

/// Routes diagnostics to the process log via `tracing`
#[derive(Debug, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn emit(&self, diag: Diagnostic) {
        let detail = diag
            .fields
            .iter()
            .map(|f| format!("{}={:?}", f.key, f.value))
            .collect::<Vec<_>>()
            .join(" ");
        warn!(diagnostic = diag.name, "{}", detail);
    }
}
