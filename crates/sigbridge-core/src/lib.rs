//! sigbridge core - event model, configuration, and sink traits
//!
//! This crate provides the foundational types and abstractions for the
//! sigbridge telemetry bridge:
//!
//! - **Signals**: the typed application event model the bridge observes
//! - **Registry**: the declared signal catalog validation runs against
//! - **Config**: the declarative table mapping signals to telemetry
//! - **Sinks**: backend-agnostic span/metric/log traits
//! - **Diagnostics**: the bridge's own fire-and-forget anomaly channel

pub mod config;
pub mod diag;
pub mod registry;
pub mod signal;
pub mod sinks;

// Re-export commonly used types
pub use config::{
    BridgeConfig, BridgeConfigFile, ConfigError, ConfigLoader, ConfigResult, LogSettings,
    MetricDefinition, OtelSettings, TraceDefinition, TraceOptions,
};
pub use diag::{Diagnostic, DiagnosticSink, TracingDiagnostics};
pub use registry::{FieldSpec, SignalRegistry, SignalSpec};
pub use signal::{
    ContextExtractor, EventContext, EventObserver, Field, FieldKind, FieldValue, ScopeExtractor,
    Severity, Signal, SignalEvent,
};
pub use sinks::{
    InstrumentKind, InstrumentSpec, LogRecordData, LogSink, Measurement, MetricSink, SpanHandle,
    SpanSink,
};

/// Bridge version
pub const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");
