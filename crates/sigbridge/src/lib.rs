//! sigbridge - a configuration-driven telemetry bridge
//!
//! Observes a stream of typed application events ("signals") and turns
//! them into distributed-tracing spans, metric measurements, and
//! structured log records. Which signals become which telemetry is
//! described by a declarative configuration table, not by call-site
//! instrumentation.
//!
//! The heart of the bridge is the trace-correlation engine: configured
//! start/end signal pairs are matched into single spans regardless of
//! arrival order, keyed by an application-supplied correlation value
//! scoped to the signal pair. Halves that never find a partner are evicted
//! by a periodic sweep with a diagnostic; configuration can be hot-reloaded
//! at runtime by swapping the engine.
//!
//! ```no_run
//! use sigbridge::{BridgeConfig, ConfigLoader, TelemetryBridge, TelemetryProviders};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ConfigLoader::new().load()?;
//! let providers = TelemetryProviders::init(&config.otel)?;
//!
//! let bridge = TelemetryBridge::builder()
//!     .span_sink(providers.span_sink())
//!     .metric_sink(providers.metric_sink())
//!     .log_sink(providers.log_sink())
//!     .build(config)?;
//!
//! // register `bridge` as the event bus observer, then at exit:
//! bridge.shutdown().await;
//! providers.shutdown();
//! # Ok(())
//! # }
//! ```

mod bridge;

pub use bridge::{BridgeBuilder, BridgeError, BridgeResult, TelemetryBridge};

// Re-export the crates a host application wires together
pub use sigbridge_core::config::{
    BridgeConfig, BridgeConfigFile, ConfigError, ConfigLoader, ConfigResult, LogSettings,
    MetricDefinition, OtelSettings, TraceDefinition, TraceOptions,
};
pub use sigbridge_core::diag::{Diagnostic, DiagnosticSink, TracingDiagnostics};
pub use sigbridge_core::registry::{FieldSpec, SignalRegistry, SignalSpec};
pub use sigbridge_core::signal::{
    ContextExtractor, EventContext, EventObserver, Field, FieldKind, FieldValue, ScopeExtractor,
    Severity, Signal, SignalEvent,
};
pub use sigbridge_core::sinks::{
    InstrumentKind, InstrumentSpec, LogRecordData, LogSink, Measurement, MetricSink, SpanHandle,
    SpanSink,
};
pub use sigbridge_emit::{LogMapper, MetricMapper};
pub use sigbridge_otel::{OtlpTransport, ProviderError, TelemetryProviders};
pub use sigbridge_trace::TraceEngine;
