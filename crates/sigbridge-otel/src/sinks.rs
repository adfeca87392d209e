//! OTel-backed implementations of the bridge sink traits
//!
//! Spans carry the events' own historical timestamps; log records carry
//! both the event timestamp and the observation timestamp; instruments are
//! created lazily and cached by metric name.

use chrono::{DateTime, Utc};
use opentelemetry::logs::{AnyValue, LogRecord as _, Logger, Severity as OtelSeverity};
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};
use opentelemetry::trace::{Span as _, Tracer as _};
use opentelemetry::{Key, KeyValue, Value};
use parking_lot::Mutex;
use sigbridge_core::signal::{Field, FieldValue, Severity};
use sigbridge_core::sinks::{
    InstrumentKind, InstrumentSpec, LogRecordData, LogSink, Measurement, MetricSink, SpanHandle,
    SpanSink,
};
use std::collections::HashMap;
use std::time::SystemTime;

/// Span sink over an SDK tracer
pub struct OtelSpanSink {
    tracer: opentelemetry_sdk::trace::Tracer,
}

impl OtelSpanSink {
    pub fn new(tracer: opentelemetry_sdk::trace::Tracer) -> Self {
        Self { tracer }
    }
}

impl SpanSink for OtelSpanSink {
    fn start_span(&self, name: &str, start: DateTime<Utc>) -> Box<dyn SpanHandle> {
        let span = self
            .tracer
            .span_builder(name.to_string())
            .with_start_time(SystemTime::from(start))
            .start(&self.tracer);
        Box::new(OtelSpanHandle { span })
    }
}

struct OtelSpanHandle {
    span: opentelemetry_sdk::trace::Span,
}

impl SpanHandle for OtelSpanHandle {
    fn set_attributes(&mut self, attrs: Vec<Field>) {
        for field in attrs {
            self.span
                .set_attribute(KeyValue::new(field.key, otel_value(field.value)));
        }
    }

    fn end(mut self: Box<Self>, at: DateTime<Utc>) {
        self.span.end_with_timestamp(SystemTime::from(at));
    }
}

/// Metric sink over an SDK meter, with lazily created cached instruments
pub struct OtelMetricSink {
    meter: Meter,
    instruments: Mutex<HashMap<String, CachedInstrument>>,
}

#[derive(Clone)]
enum CachedInstrument {
    Counter(Counter<u64>),
    UpDownCounter(UpDownCounter<i64>),
    Gauge(Gauge<f64>),
    Histogram(Histogram<f64>),
}

impl OtelMetricSink {
    pub fn new(meter: Meter) -> Self {
        Self {
            meter,
            instruments: Mutex::new(HashMap::new()),
        }
    }

    fn instrument(&self, spec: &InstrumentSpec) -> CachedInstrument {
        let mut cache = self.instruments.lock();
        cache
            .entry(spec.name.clone())
            .or_insert_with(|| build_instrument(&self.meter, spec))
            .clone()
    }
}

impl MetricSink for OtelMetricSink {
    fn record(&self, instrument: &InstrumentSpec, value: Measurement, attrs: &[Field]) {
        let kvs: Vec<KeyValue> = attrs
            .iter()
            .map(|f| KeyValue::new(f.key.clone(), otel_value(f.value.clone())))
            .collect();

        // A kind/value mismatch cannot happen for validated definitions.
        match (self.instrument(instrument), value) {
            (CachedInstrument::Counter(c), Measurement::Count(n)) => c.add(n, &kvs),
            (CachedInstrument::UpDownCounter(c), Measurement::Delta(d)) => c.add(d, &kvs),
            (CachedInstrument::Gauge(g), Measurement::Value(v)) => g.record(v, &kvs),
            (CachedInstrument::Histogram(h), Measurement::Value(v)) => h.record(v, &kvs),
            _ => {}
        }
    }
}

fn build_instrument(meter: &Meter, spec: &InstrumentSpec) -> CachedInstrument {
    match spec.kind {
        InstrumentKind::Counter => {
            let mut builder = meter.u64_counter(spec.name.clone());
            if let Some(ref unit) = spec.unit {
                builder = builder.with_unit(unit.clone());
            }
            if let Some(ref description) = spec.description {
                builder = builder.with_description(description.clone());
            }
            CachedInstrument::Counter(builder.build())
        }
        InstrumentKind::UpDownCounter => {
            let mut builder = meter.i64_up_down_counter(spec.name.clone());
            if let Some(ref unit) = spec.unit {
                builder = builder.with_unit(unit.clone());
            }
            if let Some(ref description) = spec.description {
                builder = builder.with_description(description.clone());
            }
            CachedInstrument::UpDownCounter(builder.build())
        }
        InstrumentKind::Gauge => {
            let mut builder = meter.f64_gauge(spec.name.clone());
            if let Some(ref unit) = spec.unit {
                builder = builder.with_unit(unit.clone());
            }
            if let Some(ref description) = spec.description {
                builder = builder.with_description(description.clone());
            }
            CachedInstrument::Gauge(builder.build())
        }
        InstrumentKind::Histogram => {
            let mut builder = meter.f64_histogram(spec.name.clone());
            if let Some(ref unit) = spec.unit {
                builder = builder.with_unit(unit.clone());
            }
            if let Some(ref description) = spec.description {
                builder = builder.with_description(description.clone());
            }
            CachedInstrument::Histogram(builder.build())
        }
    }
}

/// Log sink over an SDK logger
pub struct OtelLogSink {
    logger: opentelemetry_sdk::logs::Logger,
}

impl OtelLogSink {
    pub fn new(logger: opentelemetry_sdk::logs::Logger) -> Self {
        Self { logger }
    }
}

impl LogSink for OtelLogSink {
    fn emit(&self, record: LogRecordData) {
        let mut rec = self.logger.create_log_record();
        rec.set_timestamp(SystemTime::from(record.timestamp));
        rec.set_observed_timestamp(SystemTime::now());
        rec.set_severity_number(otel_severity(record.severity));
        rec.set_severity_text(record.severity.as_str());
        rec.set_body(AnyValue::String(record.body.into()));
        rec.add_attribute(Key::new("signal.name"), AnyValue::String(record.signal.into()));
        for field in record.attributes {
            rec.add_attribute(Key::new(field.key), otel_any_value(field.value));
        }
        self.logger.emit(rec);
    }
}

fn otel_value(value: FieldValue) -> Value {
    match value {
        FieldValue::String(s) => Value::String(s.into()),
        FieldValue::Int(i) => Value::I64(i),
        FieldValue::Double(d) => Value::F64(d),
        FieldValue::Bool(b) => Value::Bool(b),
    }
}

fn otel_any_value(value: FieldValue) -> AnyValue {
    match value {
        FieldValue::String(s) => AnyValue::String(s.into()),
        FieldValue::Int(i) => AnyValue::Int(i),
        FieldValue::Double(d) => AnyValue::Double(d),
        FieldValue::Bool(b) => AnyValue::Boolean(b),
    }
}

fn otel_severity(severity: Severity) -> OtelSeverity {
    match severity {
        Severity::Trace => OtelSeverity::Trace,
        Severity::Debug => OtelSeverity::Debug,
        Severity::Info => OtelSeverity::Info,
        Severity::Warn => OtelSeverity::Warn,
        Severity::Error => OtelSeverity::Error,
    }
}
