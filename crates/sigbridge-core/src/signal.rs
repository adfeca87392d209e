//! Signal and event model - the typed event stream the bridge observes
//!
//! A *signal* is a named, described event kind ("request.started"); an
//! *event* is one occurrence of a signal carrying a timestamp, severity,
//! and an ordered set of typed fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A signal identity: stable name plus optional human-readable display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Stable signal name (e.g., "request.started")
    pub name: String,

    /// Display name for UIs and span naming
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Signal {
    /// Create a signal identity from its stable name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, display: impl Into<String>) -> Self {
        self.display_name = Some(display.into());
        self
    }
}

/// One occurrence of a signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    /// Unique event identifier (ULID)
    pub event_id: String,

    /// The signal this event is an occurrence of
    pub signal: Signal,

    /// When the event happened (producer-supplied, not observation time)
    pub timestamp: DateTime<Utc>,

    /// Event severity
    pub severity: Severity,

    /// Ordered, typed fields attached to the event
    pub fields: Vec<Field>,
}

impl SignalEvent {
    /// Create a new event for a signal, stamped with the current time
    pub fn new(signal: Signal) -> Self {
        Self {
            event_id: ulid::Ulid::new().to_string(),
            signal,
            timestamp: Utc::now(),
            severity: Severity::Info,
            fields: Vec::new(),
        }
    }

    /// Set the event timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Append a field
    pub fn with_field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push(Field {
            key: key.into(),
            value,
        });
        self
    }

    /// Look up a field by key name
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Look up a string-typed field value by key name
    pub fn string_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(|f| f.value.as_str())
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

/// A typed, named value attached to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field key name
    pub key: String,

    /// Typed value
    pub value: FieldValue,
}

impl Field {
    pub fn new(key: impl Into<String>, value: FieldValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl FieldValue {
    /// The type tag of this value
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Double(_) => FieldKind::Double,
            FieldValue::Bool(_) => FieldKind::Bool,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(d: f64) -> Self {
        FieldValue::Double(d)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Field type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Int,
    Double,
    Bool,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Int => "int",
            FieldKind::Double => "double",
            FieldKind::Bool => "bool",
        }
    }

    /// Whether a value of this kind can be used as a metric measurement
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Int | FieldKind::Double)
    }
}

/// Request-scoped context travelling with an event
///
/// Cheap to clone; the correlation engine keeps the start event's context
/// alive while the match is pending so span attributes can be resolved from
/// it when the partner arrives.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    values: Arc<HashMap<String, FieldValue>>,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from scoped key/value pairs
    pub fn from_values(values: impl IntoIterator<Item = (String, FieldValue)>) -> Self {
        Self {
            values: Arc::new(values.into_iter().collect()),
        }
    }

    /// Look up a scoped value by key
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolves request-scoped attributes out of an event's context
///
/// Used by the correlation engine to enrich spans at creation time.
pub trait ContextExtractor: Send + Sync {
    /// Resolve the named keys from the context; keys with no scoped value
    /// are simply omitted.
    fn extract(&self, ctx: &EventContext, keys: &[String]) -> Vec<Field>;
}

/// Default extractor: looks keys up directly in the context bag
#[derive(Debug, Default)]
pub struct ScopeExtractor;

impl ContextExtractor for ScopeExtractor {
    fn extract(&self, ctx: &EventContext, keys: &[String]) -> Vec<Field> {
        keys.iter()
            .filter_map(|k| ctx.get(k).map(|v| Field::new(k.clone(), v.clone())))
            .collect()
    }
}

/// The callback contract the event bus invokes, once per observed event
#[async_trait::async_trait]
pub trait EventObserver: Send + Sync {
    /// Handle one event. Must not block on I/O and must not fail the bus;
    /// all anomalies are reported through side-channel diagnostics.
    async fn on_event(&self, ctx: &EventContext, event: &SignalEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup_and_typed_access() {
        let event = SignalEvent::new(Signal::new("request.started"))
            .with_field("request.id", "REQ-1".into())
            .with_field("attempt", FieldValue::Int(2));

        assert_eq!(event.string_field("request.id"), Some("REQ-1"));
        assert_eq!(event.field("attempt").unwrap().value.as_i64(), Some(2));
        assert_eq!(event.string_field("attempt"), None);
        assert!(event.field("missing").is_none());
    }

    #[test]
    fn field_value_numeric_widening() {
        assert_eq!(FieldValue::Int(5).as_f64(), Some(5.0));
        assert_eq!(FieldValue::Double(0.5).as_f64(), Some(0.5));
        assert_eq!(FieldValue::Bool(true).as_f64(), None);
        assert!(FieldKind::Int.is_numeric());
        assert!(!FieldKind::String.is_numeric());
    }

    #[test]
    fn scope_extractor_resolves_known_keys_only() {
        let ctx = EventContext::from_values([
            ("tenant.id".to_string(), FieldValue::String("t-42".into())),
            ("region".to_string(), FieldValue::String("eu-1".into())),
        ]);

        let attrs = ScopeExtractor.extract(
            &ctx,
            &["tenant.id".to_string(), "unknown.key".to_string()],
        );
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].key, "tenant.id");
        assert_eq!(attrs[0].value.as_str(), Some("t-42"));
    }

    #[test]
    fn event_serializes_with_tagged_fields() {
        let event = SignalEvent::new(Signal::new("bytes.sent"))
            .with_field("bytes", FieldValue::Int(1024));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"bytes.sent\""));
        assert!(json.contains("\"int\""));
    }
}
