//! The trace-correlation engine
//!
//! Watches the event stream for configured start/end signal pairs and
//! matches them into spans regardless of arrival order. One half of a pair
//! is buffered until its partner arrives; buffered halves that never find a
//! partner are evicted by a periodic sweep. Spans are always anchored to
//! the two events' own timestamps, never to observation time.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sigbridge_core::config::{TraceDefinition, TraceOptions, DEFAULT_TRACE_TIMEOUT_MS};
use sigbridge_core::diag::{Diagnostic, DiagnosticSink, DIAG_CORRELATION_MISSING, DIAG_EXPIRED};
use sigbridge_core::signal::{ContextExtractor, EventContext, ScopeExtractor, SignalEvent};
use sigbridge_core::sinks::SpanSink;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Eviction reason for a start whose end never arrived
pub const REASON_END_NOT_RECEIVED: &str = "end event not received";

/// Eviction reason for an end whose start never arrived
pub const REASON_START_NOT_RECEIVED: &str = "start event not received";

/// A buffered start event awaiting its end
struct PendingSpan {
    correlation: String,
    span_name: String,
    start_ts: DateTime<Utc>,
    /// The start event's originating context, kept for span attribute
    /// enrichment when the end arrives
    context: EventContext,
    /// Local processing time, used only for expiry accounting
    received_at: DateTime<Utc>,
}

/// A buffered end event awaiting its start
struct PendingEnd {
    correlation: String,
    span_name: String,
    end_ts: DateTime<Utc>,
    received_at: DateTime<Utc>,
}

/// The two pending maps, guarded by a single mutex
///
/// Invariant: for a given composite key, at most one of the two maps holds
/// an entry at any instant. The moment both sides are present they are
/// removed together, under the lock.
#[derive(Default)]
struct CorrelationStore {
    pending_starts: HashMap<String, PendingSpan>,
    pending_ends: HashMap<String, PendingEnd>,
}

/// Correlation value scoped by its signal pair, so two definitions can
/// share a correlation literal without satisfying each other's half-match
fn composite_key(correlation: &str, start_signal: &str, end_signal: &str) -> String {
    format!("{}:{}:{}", correlation, start_signal, end_signal)
}

/// The trace-correlation engine
///
/// `handle_event` never blocks on I/O and never returns an error; all
/// failure signaling goes through the optional diagnostic sink. The
/// definition set is immutable after construction - configuration changes
/// are handled by replacing the whole engine (see the bridge crate).
pub struct TraceEngine {
    definitions: Vec<TraceDefinition>,
    /// Signal name -> indices into `definitions` where it is start or end
    by_signal: HashMap<String, Vec<usize>>,
    /// Maximum of all per-definition timeouts; the sweep evicts against
    /// this single engine-wide threshold, not each entry's own timeout
    max_timeout: Duration,
    sweep_interval: Duration,
    context_keys: Vec<String>,
    store: Arc<Mutex<CorrelationStore>>,
    spans: Arc<dyn SpanSink>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    context: Arc<dyn ContextExtractor>,
    closed: Arc<AtomicBool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl TraceEngine {
    /// Create an engine over a validated definition set
    pub fn new(
        definitions: Vec<TraceDefinition>,
        options: &TraceOptions,
        spans: Arc<dyn SpanSink>,
    ) -> Self {
        let mut by_signal: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, def) in definitions.iter().enumerate() {
            by_signal.entry(def.start_signal.clone()).or_default().push(i);
            by_signal.entry(def.end_signal.clone()).or_default().push(i);
        }

        let max_timeout = definitions
            .iter()
            .map(|d| d.timeout)
            .max()
            .unwrap_or(Duration::from_millis(DEFAULT_TRACE_TIMEOUT_MS));

        Self {
            definitions,
            by_signal,
            max_timeout,
            sweep_interval: options.sweep_interval(),
            context_keys: options.context_attributes.clone(),
            store: Arc::new(Mutex::new(CorrelationStore::default())),
            spans,
            diagnostics: None,
            context: Arc::new(ScopeExtractor),
            closed: Arc::new(AtomicBool::new(false)),
            sweeper: Mutex::new(None),
        }
    }

    /// Attach a diagnostic sink
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Replace the default context extractor
    pub fn with_context_extractor(mut self, extractor: Arc<dyn ContextExtractor>) -> Self {
        self.context = extractor;
        self
    }

    /// Start the cleanup sweeper task
    ///
    /// Must be called inside a Tokio runtime. Calling it on a closed or
    /// already-running engine is a no-op.
    pub fn start(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let store = self.store.clone();
        let diagnostics = self.diagnostics.clone();
        let max_timeout = self.max_timeout;
        let closed = self.closed.clone();
        let interval = self.sweep_interval;

        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                sweep(&store, diagnostics.as_deref(), max_timeout, Utc::now());
            }
        }));
    }

    /// Handle one observed event
    ///
    /// Called once per event by the bus; safe from multiple concurrent
    /// callers. Matching is order-independent: a start arriving after its
    /// end still produces the span, anchored to the two original
    /// timestamps.
    pub fn handle_event(&self, ctx: &EventContext, event: &SignalEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let Some(indices) = self.by_signal.get(&event.signal.name) else {
            return;
        };

        for &i in indices {
            let def = &self.definitions[i];
            let Some(correlation) = event.string_field(&def.correlation_field) else {
                self.emit_diag(
                    Diagnostic::new(DIAG_CORRELATION_MISSING)
                        .with_field("signal", event.signal.name.clone())
                        .with_field("span", def.span_name.clone())
                        .with_field("field", def.correlation_field.clone()),
                );
                continue;
            };
            let key = composite_key(correlation, &def.start_signal, &def.end_signal);

            if def.start_signal == event.signal.name {
                // Span creation (sampling, allocation) happens after the
                // lock is released.
                let matched = {
                    let mut store = self.store.lock();
                    match store.pending_ends.remove(&key) {
                        Some(end) => Some(end),
                        None => {
                            store.pending_starts.insert(
                                key,
                                PendingSpan {
                                    correlation: correlation.to_string(),
                                    span_name: def.span_name.clone(),
                                    start_ts: event.timestamp,
                                    context: ctx.clone(),
                                    received_at: Utc::now(),
                                },
                            );
                            None
                        }
                    }
                };
                if let Some(end) = matched {
                    self.emit_span(&def.span_name, event.timestamp, end.end_ts, ctx);
                }
            } else {
                let matched = {
                    let mut store = self.store.lock();
                    match store.pending_starts.remove(&key) {
                        Some(start) => Some(start),
                        None => {
                            store.pending_ends.insert(
                                key,
                                PendingEnd {
                                    correlation: correlation.to_string(),
                                    span_name: def.span_name.clone(),
                                    end_ts: event.timestamp,
                                    received_at: Utc::now(),
                                },
                            );
                            None
                        }
                    }
                };
                if let Some(start) = matched {
                    self.emit_span(
                        &start.span_name,
                        start.start_ts,
                        event.timestamp,
                        &start.context,
                    );
                }
            }
        }
    }

    /// Run one cleanup pass, equivalent to a sweeper tick
    ///
    /// Exposed for deterministic testing and for hosts that drive their own
    /// schedule instead of calling [`TraceEngine::start`].
    pub fn sweep_once(&self) {
        self.sweep_at(Utc::now());
    }

    fn sweep_at(&self, now: DateTime<Utc>) {
        sweep(&self.store, self.diagnostics.as_deref(), self.max_timeout, now);
    }

    /// Number of buffered (start, end) halves
    pub fn pending_counts(&self) -> (usize, usize) {
        let store = self.store.lock();
        (store.pending_starts.len(), store.pending_ends.len())
    }

    /// Close the engine: stop the sweeper and discard all pending entries
    ///
    /// Discarded entries produce no spans and no diagnostics - shutdown is
    /// an expected event, not an anomaly. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        let mut store = self.store.lock();
        let dropped = store.pending_starts.len() + store.pending_ends.len();
        store.pending_starts.clear();
        store.pending_ends.clear();
        if dropped > 0 {
            debug!(dropped, "discarded pending correlations on close");
        }
    }

    fn emit_span(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        start_ctx: &EventContext,
    ) {
        let mut span = self.spans.start_span(name, start);
        if !self.context_keys.is_empty() {
            let attrs = self.context.extract(start_ctx, &self.context_keys);
            if !attrs.is_empty() {
                span.set_attributes(attrs);
            }
        }
        span.end(end);
        debug!(span = name, "correlated span emitted");
    }

    fn emit_diag(&self, diag: Diagnostic) {
        if let Some(sink) = &self.diagnostics {
            sink.emit(diag);
        }
    }
}

impl Drop for TraceEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

/// One eviction pass over both pending maps
///
/// Entries are evicted once their buffered age exceeds the engine-wide
/// maximum timeout - not their own definition's timeout. A definition with
/// a short timeout therefore outlives its nominal window until the
/// longest-configured window elapses; this is deliberate and covered by
/// tests.
fn sweep(
    store: &Mutex<CorrelationStore>,
    diagnostics: Option<&dyn DiagnosticSink>,
    max_timeout: Duration,
    now: DateTime<Utc>,
) {
    let stale = |received_at: DateTime<Utc>| {
        (now - received_at)
            .to_std()
            .map(|age| age > max_timeout)
            .unwrap_or(false)
    };

    let mut expired: Vec<Diagnostic> = Vec::new();
    {
        let mut store = store.lock();
        store.pending_starts.retain(|_, p| {
            if stale(p.received_at) {
                expired.push(expired_diag(&p.correlation, &p.span_name, REASON_END_NOT_RECEIVED));
                false
            } else {
                true
            }
        });
        store.pending_ends.retain(|_, p| {
            if stale(p.received_at) {
                expired.push(expired_diag(&p.correlation, &p.span_name, REASON_START_NOT_RECEIVED));
                false
            } else {
                true
            }
        });
    }

    if !expired.is_empty() {
        debug!(evicted = expired.len(), "sweep evicted stale pending entries");
        if let Some(sink) = diagnostics {
            for diag in expired {
                sink.emit(diag);
            }
        }
    }
}

fn expired_diag(correlation: &str, span_name: &str, reason: &'static str) -> Diagnostic {
    Diagnostic::new(DIAG_EXPIRED)
        .with_field("correlation", correlation.to_string())
        .with_field("span", span_name.to_string())
        .with_field("reason", reason)
}
