//! OpenTelemetry provider construction and shutdown
//!
//! Builds the tracer, meter, and logger providers over OTLP exporters from
//! validated [`OtelSettings`]. Supports gRPC and HTTP transports.

use opentelemetry::KeyValue;
use opentelemetry_otlp::{
    LogExporter, MetricExporter, Protocol, SpanExporter, WithExportConfig, WithHttpConfig,
    WithTonicConfig,
};
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{HOST_NAME, SERVICE_NAME, SERVICE_VERSION};
use sigbridge_core::config::OtelSettings;
use sigbridge_core::sinks::{LogSink, MetricSink, SpanSink};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tonic::metadata::MetadataMap;
use tracing::{info, warn};

use crate::sinks::{OtelLogSink, OtelMetricSink, OtelSpanSink};

/// Provider construction errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to create OTLP exporter: {0}")]
    ExporterInit(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// OTLP transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OtlpTransport {
    /// gRPC transport (default, recommended)
    #[default]
    Grpc,
    /// HTTP/protobuf transport
    HttpProto,
    /// HTTP/JSON transport
    HttpJson,
}

impl OtlpTransport {
    /// Parse a validated protocol string; unknown values fall back to gRPC
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "http-proto" | "http_proto" => OtlpTransport::HttpProto,
            "http-json" | "http_json" => OtlpTransport::HttpJson,
            _ => OtlpTransport::Grpc,
        }
    }
}

/// The three telemetry providers backing the bridge's sinks
///
/// Construct once at host startup; `shutdown` flushes and tears down all
/// three at process exit. The providers outlive configuration hot-reloads -
/// only the bridge's definition sets are replaced, never the backend.
pub struct TelemetryProviders {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: LoggerProvider,
}

impl TelemetryProviders {
    /// Build providers from validated settings
    ///
    /// Must be called inside a Tokio runtime; the batch processors and the
    /// periodic metric reader run on it.
    pub fn init(settings: &OtelSettings) -> ProviderResult<Self> {
        let transport = OtlpTransport::parse(&settings.protocol);
        let resource = build_resource(settings);
        let headers = auth_headers(settings);
        let timeout = Duration::from_millis(settings.timeout_ms);
        let flush_interval = Duration::from_millis(settings.flush_interval_ms);

        let span_exporter = build_span_exporter(settings, transport, &headers, timeout)?;
        let tracer_provider = TracerProvider::builder()
            .with_resource(resource.clone())
            .with_batch_exporter(span_exporter, opentelemetry_sdk::runtime::Tokio)
            .build();

        let metric_exporter = build_metric_exporter(settings, transport, &headers, timeout)?;
        let reader = PeriodicReader::builder(metric_exporter, opentelemetry_sdk::runtime::Tokio)
            .with_interval(flush_interval)
            .build();
        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build();

        let log_exporter = build_log_exporter(settings, transport, &headers, timeout)?;
        let log_processor = opentelemetry_sdk::logs::BatchLogProcessor::builder(
            log_exporter,
            opentelemetry_sdk::runtime::Tokio,
        )
        .with_batch_config(
            opentelemetry_sdk::logs::BatchConfigBuilder::default()
                .with_max_export_batch_size(settings.batch_size)
                .with_scheduled_delay(flush_interval)
                .build(),
        )
        .build();
        let logger_provider = LoggerProvider::builder()
            .with_resource(resource)
            .with_log_processor(log_processor)
            .build();

        info!(
            "Telemetry providers initialized: endpoint={}, transport={:?}",
            settings.endpoint, transport
        );

        Ok(Self {
            tracer_provider,
            meter_provider,
            logger_provider,
        })
    }

    /// Span sink over the tracer provider
    pub fn span_sink(&self) -> Arc<dyn SpanSink> {
        use opentelemetry::trace::TracerProvider as _;
        Arc::new(OtelSpanSink::new(self.tracer_provider.tracer("sigbridge")))
    }

    /// Metric sink over the meter provider
    pub fn metric_sink(&self) -> Arc<dyn MetricSink> {
        use opentelemetry::metrics::MeterProvider as _;
        Arc::new(OtelMetricSink::new(self.meter_provider.meter("sigbridge")))
    }

    /// Log sink over the logger provider
    pub fn log_sink(&self) -> Arc<dyn LogSink> {
        use opentelemetry::logs::LoggerProvider as _;
        Arc::new(OtelLogSink::new(self.logger_provider.logger("sigbridge")))
    }

    /// Flush and shut down all three providers
    ///
    /// Errors are logged, not returned - shutdown proceeds through every
    /// provider regardless.
    pub fn shutdown(&self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            warn!("Error shutting down tracer provider: {:?}", e);
        }
        if let Err(e) = self.meter_provider.shutdown() {
            warn!("Error shutting down meter provider: {:?}", e);
        }
        if let Err(e) = self.logger_provider.shutdown() {
            warn!("Error shutting down logger provider: {:?}", e);
        }
        info!("Telemetry providers shutdown complete");
    }
}

/// Resource attributes shared by all three providers
fn build_resource(settings: &OtelSettings) -> Resource {
    let mut attrs = vec![KeyValue::new(SERVICE_NAME, settings.service_name.clone())];

    if let Some(ref version) = settings.service_version {
        attrs.push(KeyValue::new(SERVICE_VERSION, version.clone()));
    }

    if let Ok(host) = hostname::get() {
        attrs.push(KeyValue::new(HOST_NAME, host.to_string_lossy().to_string()));
    }

    for (key, value) in &settings.resource_attributes {
        attrs.push(KeyValue::new(key.clone(), value.clone()));
    }

    Resource::new(attrs)
}

/// Merge configured headers with the convenience auth settings
fn auth_headers(settings: &OtelSettings) -> HashMap<String, String> {
    let mut headers = settings.headers.clone();
    if let Some(ref api_key) = settings.api_key {
        headers.insert("x-api-key".to_string(), api_key.clone());
    }
    if let Some(ref token) = settings.bearer_token {
        headers.insert("Authorization".to_string(), format!("Bearer {}", token));
    }
    headers
}

/// Headers as gRPC metadata; unparseable entries are dropped
fn grpc_metadata(headers: &HashMap<String, String>) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (key, value) in headers {
        if let (Ok(key), Ok(value)) = (
            key.parse::<tonic::metadata::MetadataKey<tonic::metadata::Ascii>>(),
            value.parse::<tonic::metadata::MetadataValue<tonic::metadata::Ascii>>(),
        ) {
            metadata.insert(key, value);
        }
    }
    metadata
}

/// Per-signal HTTP endpoint: the configured endpoint is the collector base
/// (e.g. http://localhost:4318)
fn http_endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

fn build_span_exporter(
    settings: &OtelSettings,
    transport: OtlpTransport,
    headers: &HashMap<String, String>,
    timeout: Duration,
) -> ProviderResult<SpanExporter> {
    match transport {
        OtlpTransport::Grpc => {
            let mut builder = SpanExporter::builder()
                .with_tonic()
                .with_endpoint(&settings.endpoint)
                .with_timeout(timeout);
            if !headers.is_empty() {
                builder = builder.with_metadata(grpc_metadata(headers));
            }
            if settings.compression {
                builder = builder.with_compression(opentelemetry_otlp::Compression::Gzip);
            }
            builder.build().map_err(|e| {
                ProviderError::ExporterInit(format!("gRPC span exporter: {}", e))
            })
        }
        OtlpTransport::HttpProto | OtlpTransport::HttpJson => {
            let protocol = if transport == OtlpTransport::HttpProto {
                Protocol::HttpBinary
            } else {
                Protocol::HttpJson
            };
            let mut builder = SpanExporter::builder()
                .with_http()
                .with_endpoint(http_endpoint(&settings.endpoint, "v1/traces"))
                .with_timeout(timeout)
                .with_protocol(protocol);
            if !headers.is_empty() {
                builder = builder.with_headers(headers.clone());
            }
            builder.build().map_err(|e| {
                ProviderError::ExporterInit(format!("HTTP span exporter: {}", e))
            })
        }
    }
}

fn build_metric_exporter(
    settings: &OtelSettings,
    transport: OtlpTransport,
    headers: &HashMap<String, String>,
    timeout: Duration,
) -> ProviderResult<MetricExporter> {
    match transport {
        OtlpTransport::Grpc => {
            let mut builder = MetricExporter::builder()
                .with_tonic()
                .with_endpoint(&settings.endpoint)
                .with_timeout(timeout);
            if !headers.is_empty() {
                builder = builder.with_metadata(grpc_metadata(headers));
            }
            if settings.compression {
                builder = builder.with_compression(opentelemetry_otlp::Compression::Gzip);
            }
            builder.build().map_err(|e| {
                ProviderError::ExporterInit(format!("gRPC metric exporter: {}", e))
            })
        }
        OtlpTransport::HttpProto | OtlpTransport::HttpJson => {
            let protocol = if transport == OtlpTransport::HttpProto {
                Protocol::HttpBinary
            } else {
                Protocol::HttpJson
            };
            let mut builder = MetricExporter::builder()
                .with_http()
                .with_endpoint(http_endpoint(&settings.endpoint, "v1/metrics"))
                .with_timeout(timeout)
                .with_protocol(protocol);
            if !headers.is_empty() {
                builder = builder.with_headers(headers.clone());
            }
            builder.build().map_err(|e| {
                ProviderError::ExporterInit(format!("HTTP metric exporter: {}", e))
            })
        }
    }
}

fn build_log_exporter(
    settings: &OtelSettings,
    transport: OtlpTransport,
    headers: &HashMap<String, String>,
    timeout: Duration,
) -> ProviderResult<LogExporter> {
    match transport {
        OtlpTransport::Grpc => {
            let mut builder = LogExporter::builder()
                .with_tonic()
                .with_endpoint(&settings.endpoint)
                .with_timeout(timeout);
            if !headers.is_empty() {
                builder = builder.with_metadata(grpc_metadata(headers));
            }
            if settings.compression {
                builder = builder.with_compression(opentelemetry_otlp::Compression::Gzip);
            }
            builder
                .build()
                .map_err(|e| ProviderError::ExporterInit(format!("gRPC log exporter: {}", e)))
        }
        OtlpTransport::HttpProto | OtlpTransport::HttpJson => {
            let protocol = if transport == OtlpTransport::HttpProto {
                Protocol::HttpBinary
            } else {
                Protocol::HttpJson
            };
            let mut builder = LogExporter::builder()
                .with_http()
                .with_endpoint(http_endpoint(&settings.endpoint, "v1/logs"))
                .with_timeout(timeout)
                .with_protocol(protocol);
            if !headers.is_empty() {
                builder = builder.with_headers(headers.clone());
            }
            builder
                .build()
                .map_err(|e| ProviderError::ExporterInit(format!("HTTP log exporter: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_parses_validated_protocols() {
        assert_eq!(OtlpTransport::parse("grpc"), OtlpTransport::Grpc);
        assert_eq!(OtlpTransport::parse("http-proto"), OtlpTransport::HttpProto);
        assert_eq!(OtlpTransport::parse("HTTP_JSON"), OtlpTransport::HttpJson);
        assert_eq!(OtlpTransport::default(), OtlpTransport::Grpc);
    }

    #[test]
    fn http_endpoint_appends_signal_path() {
        assert_eq!(
            http_endpoint("http://localhost:4318", "v1/traces"),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            http_endpoint("http://localhost:4318/", "v1/logs"),
            "http://localhost:4318/v1/logs"
        );
    }

    #[test]
    fn auth_settings_become_headers() {
        let settings = OtelSettings {
            api_key: Some("secret".to_string()),
            bearer_token: Some("tok".to_string()),
            ..OtelSettings::default()
        };
        let headers = auth_headers(&settings);
        assert_eq!(headers.get("x-api-key").map(String::as_str), Some("secret"));
        assert_eq!(
            headers.get("Authorization").map(String::as_str),
            Some("Bearer tok")
        );
    }
}
