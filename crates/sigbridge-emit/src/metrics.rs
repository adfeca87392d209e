//! Signal-to-metric translation
//!
//! Each configured metric definition names a signal, an instrument kind,
//! and the field holding the measurement. Translation is purely type
//! directed: counters and up/down counters read integer fields (counters
//! with no value field count 1 per event), gauges and histograms read any
//! numeric field. Events that cannot yield a usable measurement are
//! dropped with a diagnostic, never an error.

use sigbridge_core::config::MetricDefinition;
use sigbridge_core::diag::{Diagnostic, DiagnosticSink, DIAG_METRIC_VALUE_MISSING};
use sigbridge_core::signal::{Field, SignalEvent};
use sigbridge_core::sinks::{InstrumentKind, Measurement, MetricSink};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Maps observed events onto metric instruments
pub struct MetricMapper {
    definitions: Vec<MetricDefinition>,
    /// Signal name -> indices into `definitions`
    by_signal: HashMap<String, Vec<usize>>,
    sink: Arc<dyn MetricSink>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl MetricMapper {
    /// Create a mapper over a validated definition set
    pub fn new(definitions: Vec<MetricDefinition>, sink: Arc<dyn MetricSink>) -> Self {
        let mut by_signal: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, def) in definitions.iter().enumerate() {
            by_signal.entry(def.signal.clone()).or_default().push(i);
        }
        Self {
            definitions,
            by_signal,
            sink,
            diagnostics: None,
        }
    }

    /// Attach a diagnostic sink
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Record one measurement per matching definition for this event
    pub fn handle_event(&self, event: &SignalEvent) {
        let Some(indices) = self.by_signal.get(&event.signal.name) else {
            return;
        };

        for &i in indices {
            let def = &self.definitions[i];
            let measurement = match self.extract_measurement(def, event) {
                Some(m) => m,
                None => continue,
            };

            let attrs: Vec<Field> = def
                .attributes
                .iter()
                .filter_map(|k| event.field(k).cloned())
                .collect();

            self.sink.record(&def.instrument, measurement, &attrs);
            trace!(metric = %def.instrument.name, "recorded measurement");
        }
    }

    fn extract_measurement(
        &self,
        def: &MetricDefinition,
        event: &SignalEvent,
    ) -> Option<Measurement> {
        let Some(field) = &def.value_field else {
            // Valueless definitions are counters; each event counts 1.
            return Some(Measurement::Count(1));
        };

        let value = event.field(field).map(|f| &f.value);
        let measurement = match def.instrument.kind {
            InstrumentKind::Counter => value
                .and_then(|v| v.as_i64())
                .and_then(|i| u64::try_from(i).ok())
                .map(Measurement::Count),
            InstrumentKind::UpDownCounter => {
                value.and_then(|v| v.as_i64()).map(Measurement::Delta)
            }
            InstrumentKind::Gauge | InstrumentKind::Histogram => {
                value.and_then(|v| v.as_f64()).map(Measurement::Value)
            }
        };

        if measurement.is_none() {
            if let Some(sink) = &self.diagnostics {
                sink.emit(
                    Diagnostic::new(DIAG_METRIC_VALUE_MISSING)
                        .with_field("signal", event.signal.name.clone())
                        .with_field("metric", def.instrument.name.clone())
                        .with_field("field", field.clone()),
                );
            }
        }
        measurement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sigbridge_core::signal::{FieldValue, Signal};
    use sigbridge_core::sinks::InstrumentSpec;

    #[derive(Debug, Clone)]
    struct Recorded {
        name: String,
        kind: InstrumentKind,
        value: Measurement,
        attrs: Vec<Field>,
    }

    #[derive(Default)]
    struct RecordingMetrics {
        records: Mutex<Vec<Recorded>>,
    }

    impl MetricSink for RecordingMetrics {
        fn record(&self, instrument: &InstrumentSpec, value: Measurement, attrs: &[Field]) {
            self.records.lock().push(Recorded {
                name: instrument.name.clone(),
                kind: instrument.kind,
                value,
                attrs: attrs.to_vec(),
            });
        }
    }

    #[derive(Default)]
    struct RecordingDiags {
        diags: Mutex<Vec<Diagnostic>>,
    }

    impl DiagnosticSink for RecordingDiags {
        fn emit(&self, diag: Diagnostic) {
            self.diags.lock().push(diag);
        }
    }

    fn def(
        signal: &str,
        name: &str,
        kind: InstrumentKind,
        value_field: Option<&str>,
        attributes: &[&str],
    ) -> MetricDefinition {
        MetricDefinition {
            signal: signal.to_string(),
            instrument: InstrumentSpec {
                name: name.to_string(),
                kind,
                unit: None,
                description: None,
            },
            value_field: value_field.map(|s| s.to_string()),
            attributes: attributes.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn mapper(defs: Vec<MetricDefinition>) -> (MetricMapper, Arc<RecordingMetrics>, Arc<RecordingDiags>) {
        let sink = Arc::new(RecordingMetrics::default());
        let diags = Arc::new(RecordingDiags::default());
        let mapper = MetricMapper::new(defs, sink.clone()).with_diagnostics(diags.clone());
        (mapper, sink, diags)
    }

    #[test]
    fn counter_reads_integer_value_field() {
        let (mapper, sink, _) = mapper(vec![def(
            "bytes.sent",
            "app.bytes_sent",
            InstrumentKind::Counter,
            Some("bytes"),
            &["endpoint"],
        )]);

        let event = SignalEvent::new(Signal::new("bytes.sent"))
            .with_field("bytes", FieldValue::Int(1024))
            .with_field("endpoint", "/api/v1".into());
        mapper.handle_event(&event);

        let records = sink.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "app.bytes_sent");
        assert_eq!(records[0].value, Measurement::Count(1024));
        assert_eq!(records[0].attrs.len(), 1);
        assert_eq!(records[0].attrs[0].key, "endpoint");
    }

    #[test]
    fn valueless_counter_counts_one_per_event() {
        let (mapper, sink, _) = mapper(vec![def(
            "cache.miss",
            "app.cache_misses",
            InstrumentKind::Counter,
            None,
            &[],
        )]);

        let event = SignalEvent::new(Signal::new("cache.miss"));
        mapper.handle_event(&event);
        mapper.handle_event(&event);

        let records = sink.records.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value, Measurement::Count(1));
    }

    #[test]
    fn gauge_and_histogram_widen_to_double() {
        let (mapper, sink, _) = mapper(vec![
            def("queue.depth", "app.queue_depth", InstrumentKind::Gauge, Some("depth"), &[]),
            def("queue.depth", "app.queue_wait", InstrumentKind::Histogram, Some("wait_ms"), &[]),
        ]);

        let event = SignalEvent::new(Signal::new("queue.depth"))
            .with_field("depth", FieldValue::Int(17))
            .with_field("wait_ms", FieldValue::Double(3.5));
        mapper.handle_event(&event);

        let records = sink.records.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, InstrumentKind::Gauge);
        assert_eq!(records[0].value, Measurement::Value(17.0));
        assert_eq!(records[1].value, Measurement::Value(3.5));
    }

    #[test]
    fn up_down_counter_keeps_sign() {
        let (mapper, sink, _) = mapper(vec![def(
            "pool.resize",
            "app.pool_size",
            InstrumentKind::UpDownCounter,
            Some("delta"),
            &[],
        )]);

        let event =
            SignalEvent::new(Signal::new("pool.resize")).with_field("delta", FieldValue::Int(-3));
        mapper.handle_event(&event);

        assert_eq!(sink.records.lock()[0].value, Measurement::Delta(-3));
    }

    #[test]
    fn missing_or_unusable_value_emits_diagnostic_and_records_nothing() {
        let (mapper, sink, diags) = mapper(vec![def(
            "bytes.sent",
            "app.bytes_sent",
            InstrumentKind::Counter,
            Some("bytes"),
            &[],
        )]);

        // Field absent entirely.
        mapper.handle_event(&SignalEvent::new(Signal::new("bytes.sent")));
        // Field present but negative - unusable as a counter increment.
        mapper.handle_event(
            &SignalEvent::new(Signal::new("bytes.sent")).with_field("bytes", FieldValue::Int(-1)),
        );

        assert!(sink.records.lock().is_empty());
        let diags = diags.diags.lock();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].name, DIAG_METRIC_VALUE_MISSING);
    }

    #[test]
    fn unrelated_signals_are_ignored() {
        let (mapper, sink, diags) = mapper(vec![def(
            "bytes.sent",
            "app.bytes_sent",
            InstrumentKind::Counter,
            None,
            &[],
        )]);

        mapper.handle_event(&SignalEvent::new(Signal::new("something.else")));

        assert!(sink.records.lock().is_empty());
        assert!(diags.diags.lock().is_empty());
    }
}
