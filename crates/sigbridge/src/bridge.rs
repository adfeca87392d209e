//! The bridge facade - event observation, dispatch, and hot reload
//!
//! One `TelemetryBridge` is registered as the event bus's observer. Each
//! observed event is dispatched to the log mapper, the metric mapper, and
//! the trace-correlation engine. Configuration hot-reload replaces the
//! whole mapping state under a write lock; acquiring it waits for every
//! in-flight `observe` to finish, so no event is processed against a
//! half-swapped configuration.

use sigbridge_core::config::{BridgeConfig, ConfigError};
use sigbridge_core::diag::DiagnosticSink;
use sigbridge_core::signal::{ContextExtractor, EventContext, EventObserver, SignalEvent};
use sigbridge_core::sinks::{LogSink, MetricSink, SpanSink};
use sigbridge_emit::{LogMapper, MetricMapper};
use sigbridge_trace::TraceEngine;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Bridge construction errors
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Bridge requires a {0} sink")]
    MissingSink(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// The sinks a bridge writes through; shared across reloads
struct BridgeSinks {
    spans: Arc<dyn SpanSink>,
    metrics: Arc<dyn MetricSink>,
    logs: Arc<dyn LogSink>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    context_extractor: Option<Arc<dyn ContextExtractor>>,
}

/// The swappable per-configuration state
struct BridgeState {
    engine: TraceEngine,
    metrics: MetricMapper,
    logs: LogMapper,
}

/// The telemetry bridge
pub struct TelemetryBridge {
    state: RwLock<BridgeState>,
    sinks: BridgeSinks,
}

impl TelemetryBridge {
    /// Start building a bridge
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    /// Handle one observed event
    ///
    /// Dispatches to the log, metric, and trace paths. Never returns an
    /// error to the bus; anomalies go to the diagnostic sink.
    pub async fn observe(&self, ctx: &EventContext, event: &SignalEvent) {
        let state = self.state.read().await;
        state.logs.handle_event(event);
        state.metrics.handle_event(event);
        state.engine.handle_event(ctx, event);
    }

    /// Replace the bridge's configuration at runtime
    ///
    /// The replacement state is built first; the write lock then drains all
    /// in-flight `observe` calls before the swap. The old engine is closed
    /// afterwards: correlations that were only half-complete at reload time
    /// are dropped silently, exactly as on shutdown.
    pub async fn reload(&self, config: BridgeConfig) -> BridgeResult<()> {
        let new_state = build_state(&config, &self.sinks);
        let mut state = self.state.write().await;
        let old = std::mem::replace(&mut *state, new_state);
        drop(state);
        old.engine.close();
        info!(
            traces = config.traces.len(),
            metrics = config.metrics.len(),
            "bridge configuration reloaded"
        );
        Ok(())
    }

    /// Close the trace engine, discarding pending correlations
    ///
    /// Safe to call more than once. The metric and log paths are stateless
    /// and need no teardown of their own.
    pub async fn shutdown(&self) {
        let state = self.state.read().await;
        state.engine.close();
        debug!("bridge shut down");
    }

    /// Buffered (start, end) correlation halves, for introspection
    pub async fn pending_correlations(&self) -> (usize, usize) {
        self.state.read().await.engine.pending_counts()
    }
}

#[async_trait::async_trait]
impl EventObserver for TelemetryBridge {
    async fn on_event(&self, ctx: &EventContext, event: &SignalEvent) {
        self.observe(ctx, event).await;
    }
}

fn build_state(config: &BridgeConfig, sinks: &BridgeSinks) -> BridgeState {
    let mut engine = TraceEngine::new(
        config.traces.clone(),
        &config.trace_options,
        sinks.spans.clone(),
    );
    if let Some(diag) = &sinks.diagnostics {
        engine = engine.with_diagnostics(diag.clone());
    }
    if let Some(extractor) = &sinks.context_extractor {
        engine = engine.with_context_extractor(extractor.clone());
    }
    engine.start();

    let mut metrics = MetricMapper::new(config.metrics.clone(), sinks.metrics.clone());
    if let Some(diag) = &sinks.diagnostics {
        metrics = metrics.with_diagnostics(diag.clone());
    }

    let logs = LogMapper::new(&config.logs, sinks.logs.clone());

    BridgeState {
        engine,
        metrics,
        logs,
    }
}

/// Builder for [`TelemetryBridge`]
#[derive(Default)]
pub struct BridgeBuilder {
    spans: Option<Arc<dyn SpanSink>>,
    metrics: Option<Arc<dyn MetricSink>>,
    logs: Option<Arc<dyn LogSink>>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    context_extractor: Option<Arc<dyn ContextExtractor>>,
}

impl BridgeBuilder {
    /// Span sink (required)
    pub fn span_sink(mut self, sink: Arc<dyn SpanSink>) -> Self {
        self.spans = Some(sink);
        self
    }

    /// Metric sink (required)
    pub fn metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Log sink (required)
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.logs = Some(sink);
        self
    }

    /// Diagnostic sink (optional); without one, bridge anomalies are not
    /// observable externally but processing is unaffected
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Replace the default context extractor (optional)
    pub fn context_extractor(mut self, extractor: Arc<dyn ContextExtractor>) -> Self {
        self.context_extractor = Some(extractor);
        self
    }

    /// Build the bridge over a validated configuration
    ///
    /// Must be called inside a Tokio runtime; the engine's cleanup sweeper
    /// is spawned on it.
    pub fn build(self, config: BridgeConfig) -> BridgeResult<TelemetryBridge> {
        let sinks = BridgeSinks {
            spans: self.spans.ok_or(BridgeError::MissingSink("span"))?,
            metrics: self.metrics.ok_or(BridgeError::MissingSink("metric"))?,
            logs: self.logs.ok_or(BridgeError::MissingSink("log"))?,
            diagnostics: self.diagnostics,
            context_extractor: self.context_extractor,
        };
        let state = build_state(&config, &sinks);
        info!(
            signals = config.registry.len(),
            traces = config.traces.len(),
            metrics = config.metrics.len(),
            "bridge built"
        );
        Ok(TelemetryBridge {
            state: RwLock::new(state),
            sinks,
        })
    }

    /// Parse, validate, and build in one step
    pub fn build_from_toml(self, content: &str) -> BridgeResult<TelemetryBridge> {
        let config = BridgeConfig::from_toml_str(content)?;
        self.build(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use sigbridge_core::config::BridgeConfig;
    use sigbridge_core::diag::Diagnostic;
    use sigbridge_core::signal::{Field, FieldValue, Signal};
    use sigbridge_core::sinks::{InstrumentSpec, LogRecordData, Measurement, SpanHandle};

    #[derive(Debug, Clone)]
    struct RecordedSpan {
        name: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    }

    #[derive(Default)]
    struct RecordingSinks {
        spans: Mutex<Vec<RecordedSpan>>,
        measurements: Mutex<Vec<(String, Measurement)>>,
        logs: Mutex<Vec<LogRecordData>>,
        diags: Mutex<Vec<Diagnostic>>,
    }

    struct Handle {
        name: String,
        start: DateTime<Utc>,
        out: Arc<RecordingSinks>,
    }

    impl SpanHandle for Handle {
        fn set_attributes(&mut self, _attrs: Vec<Field>) {}

        fn end(self: Box<Self>, at: DateTime<Utc>) {
            self.out.spans.lock().push(RecordedSpan {
                name: self.name,
                start: self.start,
                end: at,
            });
        }
    }

    // Local newtype so the foreign sink traits can be implemented for a
    // shared `RecordingSinks` without tripping the orphan rule (`Arc` is not
    // a fundamental type, so `impl Trait for Arc<Local>` is disallowed).
    #[derive(Clone)]
    struct Shared(Arc<RecordingSinks>);

    impl SpanSink for Shared {
        fn start_span(&self, name: &str, start: DateTime<Utc>) -> Box<dyn SpanHandle> {
            Box::new(Handle {
                name: name.to_string(),
                start,
                out: self.0.clone(),
            })
        }
    }

    impl MetricSink for Shared {
        fn record(&self, instrument: &InstrumentSpec, value: Measurement, _attrs: &[Field]) {
            self.0
                .measurements
                .lock()
                .push((instrument.name.clone(), value));
        }
    }

    impl LogSink for Shared {
        fn emit(&self, record: LogRecordData) {
            self.0.logs.lock().push(record);
        }
    }

    impl DiagnosticSink for Shared {
        fn emit(&self, diag: Diagnostic) {
            self.0.diags.lock().push(diag);
        }
    }

    const CONFIG: &str = r#"
        [[signals]]
        name = "request.started"
        fields = [{ name = "request.id", type = "string" }]

        [[signals]]
        name = "request.completed"
        fields = [
            { name = "request.id", type = "string" },
            { name = "status", type = "int" },
        ]

        [[traces]]
        start = "request.started"
        end = "request.completed"
        correlation_field = "request.id"
        span_name = "http.request"

        [[metrics]]
        signal = "request.completed"
        name = "app.requests"
        instrument = "counter"

        [logs]
        enabled = true
        signals = ["request.completed"]
    "#;

    fn bridge(config: &str) -> (TelemetryBridge, Arc<RecordingSinks>) {
        let sinks = Arc::new(RecordingSinks::default());
        let bridge = TelemetryBridge::builder()
            .span_sink(Arc::new(Shared(sinks.clone())))
            .metric_sink(Arc::new(Shared(sinks.clone())))
            .log_sink(Arc::new(Shared(sinks.clone())))
            .diagnostics(Arc::new(Shared(sinks.clone())))
            .build_from_toml(config)
            .unwrap();
        (bridge, sinks)
    }

    fn started(correlation: &str, ts: DateTime<Utc>) -> SignalEvent {
        SignalEvent::new(Signal::new("request.started"))
            .at(ts)
            .with_field("request.id", correlation.into())
    }

    fn completed(correlation: &str, ts: DateTime<Utc>) -> SignalEvent {
        SignalEvent::new(Signal::new("request.completed"))
            .at(ts)
            .with_field("request.id", correlation.into())
            .with_field("status", FieldValue::Int(200))
    }

    #[tokio::test]
    async fn observe_dispatches_to_all_three_paths() {
        let (bridge, sinks) = bridge(CONFIG);
        let ctx = EventContext::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::milliseconds(50);

        bridge.observe(&ctx, &started("REQ-1", t0)).await;
        bridge.observe(&ctx, &completed("REQ-1", t1)).await;

        let spans = sinks.spans.lock();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "http.request");
        assert_eq!(spans[0].start, t0);
        assert_eq!(spans[0].end, t1);

        assert_eq!(sinks.measurements.lock().len(), 1);
        // Only the whitelisted signal reaches the log sink.
        assert_eq!(sinks.logs.lock().len(), 1);
        assert_eq!(sinks.logs.lock()[0].signal, "request.completed");

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn reload_swaps_definitions_and_drops_pending_halves() {
        let (bridge, sinks) = bridge(CONFIG);
        let ctx = EventContext::new();
        let t0 = Utc::now();

        bridge.observe(&ctx, &started("REQ-1", t0)).await;
        assert_eq!(bridge.pending_correlations().await, (1, 0));

        // New configuration renames the span.
        let renamed = CONFIG.replace("http.request", "inbound.request");
        let new_config = BridgeConfig::from_toml_str(&renamed).unwrap();
        bridge.reload(new_config).await.unwrap();

        // The pending half did not survive the reload, and no span or
        // diagnostic was produced for it.
        assert_eq!(bridge.pending_correlations().await, (0, 0));
        bridge
            .observe(&ctx, &completed("REQ-1", t0 + chrono::Duration::milliseconds(10)))
            .await;
        assert!(sinks.spans.lock().is_empty());
        assert!(sinks.diags.lock().is_empty());

        // A fresh pair correlates under the new definition set.
        bridge.observe(&ctx, &started("REQ-2", t0)).await;
        bridge
            .observe(&ctx, &completed("REQ-2", t0 + chrono::Duration::milliseconds(20)))
            .await;
        // The stray completed above buffered as a pending end first.
        let spans = sinks.spans.lock();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "inbound.request");

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (bridge, _sinks) = bridge(CONFIG);
        let ctx = EventContext::new();

        bridge.observe(&ctx, &started("REQ-1", Utc::now())).await;
        bridge.shutdown().await;
        assert_eq!(bridge.pending_correlations().await, (0, 0));
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn builder_requires_all_three_sinks() {
        let sinks = Arc::new(RecordingSinks::default());
        let result = TelemetryBridge::builder()
            .span_sink(Arc::new(Shared(sinks.clone())))
            .build_from_toml(CONFIG);
        assert!(matches!(result, Err(BridgeError::MissingSink(_))));
    }
}
