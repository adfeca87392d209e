//! Sink traits - the telemetry backend boundary
//!
//! The bridge never talks to a backend directly; spans, measurements, and
//! log records go through these traits so the engine and mappers stay
//! testable and backend-agnostic. OTel-backed implementations live in
//! `sigbridge-otel`.

use crate::signal::{Field, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A span in flight, started at an explicit historical timestamp
pub trait SpanHandle: Send {
    /// Attach attributes to the span
    fn set_attributes(&mut self, attrs: Vec<Field>);

    /// End the span at an explicit historical timestamp
    fn end(self: Box<Self>, at: DateTime<Utc>);
}

/// Starts spans against the tracing backend
///
/// Implementations may sample or allocate; callers must not invoke this
/// while holding internal locks.
pub trait SpanSink: Send + Sync {
    /// Start a span with an explicit (historical) start timestamp
    fn start_span(&self, name: &str, start: DateTime<Utc>) -> Box<dyn SpanHandle>;
}

/// Metric instrument kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Monotonic sum
    Counter,
    /// Non-monotonic sum
    UpDownCounter,
    /// Last-value
    Gauge,
    /// Distribution
    Histogram,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::UpDownCounter => "up_down_counter",
            InstrumentKind::Gauge => "gauge",
            InstrumentKind::Histogram => "histogram",
        }
    }
}

/// Identity and metadata of one metric instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Metric name
    pub name: String,

    /// Instrument kind
    pub kind: InstrumentKind,

    /// Unit (UCUM), if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Description, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One recorded measurement value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Counter increment
    Count(u64),
    /// Up/down counter delta
    Delta(i64),
    /// Gauge or histogram value
    Value(f64),
}

/// Records measurements against the metrics backend
pub trait MetricSink: Send + Sync {
    /// Record one measurement on the named instrument. Implementations are
    /// expected to create instruments lazily and cache them by name.
    fn record(&self, instrument: &InstrumentSpec, value: Measurement, attrs: &[Field]);
}

/// One structured log record produced from an event
#[derive(Debug, Clone)]
pub struct LogRecordData {
    /// The event's own timestamp
    pub timestamp: DateTime<Utc>,

    /// Event severity
    pub severity: Severity,

    /// Signal name of the originating event
    pub signal: String,

    /// Record body (JSON-serialized event)
    pub body: String,

    /// One attribute per event field
    pub attributes: Vec<Field>,
}

/// Emits structured log records, fire-and-forget
pub trait LogSink: Send + Sync {
    fn emit(&self, record: LogRecordData);
}
