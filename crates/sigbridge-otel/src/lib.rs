//! OpenTelemetry backend for the sigbridge telemetry bridge
//!
//! Provider construction over OTLP (gRPC, HTTP/protobuf, HTTP/JSON) and
//! the OTel-backed implementations of the bridge's span, metric, and log
//! sink traits.

mod provider;
mod sinks;

pub use provider::{OtlpTransport, ProviderError, ProviderResult, TelemetryProviders};
pub use sinks::{OtelLogSink, OtelMetricSink, OtelSpanSink};
