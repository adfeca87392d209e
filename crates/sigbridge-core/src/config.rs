//! Configuration system for the telemetry bridge
//!
//! Provides:
//! - Config file discovery (explicit path, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Validation against the signal registry
//!
//! Which signals become which telemetry is described here declaratively;
//! there is no call-site instrumentation. Validation happens once, up
//! front - the correlation engine and the mappers assume well-formed
//! definitions and never re-check them.

use crate::registry::{SignalRegistry, SignalSpec};
use crate::signal::FieldKind;
use crate::sinks::{InstrumentKind, InstrumentSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default per-definition correlation timeout (5 minutes)
pub const DEFAULT_TRACE_TIMEOUT_MS: u64 = 300_000;

/// Default cleanup sweep interval (1 minute)
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Raw bridge configuration as written in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfigFile {
    /// Declared signal catalog
    pub signals: Vec<SignalSpec>,

    /// Start/end pairs that become spans
    pub traces: Vec<TraceConfig>,

    /// Engine-wide trace options
    pub trace_options: TraceOptions,

    /// Signals that become metric instruments
    pub metrics: Vec<MetricConfig>,

    /// Log record emission settings
    pub logs: LogSettings,

    /// Telemetry backend settings
    pub otel: OtelSettings,
}

/// One declarative trace definition: a start/end signal pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Start signal name
    pub start: String,

    /// End signal name
    pub end: String,

    /// Field key holding the correlation value (must be string-typed on
    /// both signals)
    pub correlation_field: String,

    /// Span display name; defaults to the start signal's name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_name: Option<String>,

    /// Pending-match timeout in milliseconds; 0 or unset means the default
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Engine-wide trace options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOptions {
    /// Cleanup sweep interval in milliseconds
    pub sweep_interval_ms: u64,

    /// Context keys attached as span attributes, resolved from the start
    /// event's context
    pub context_attributes: Vec<String>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            context_attributes: Vec::new(),
        }
    }
}

impl TraceOptions {
    /// Sweep interval as a `Duration`
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

/// One declarative metric definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Signal whose events feed this instrument
    pub signal: String,

    /// Metric name
    pub name: String,

    /// Instrument kind
    pub instrument: InstrumentKind,

    /// Field key holding the measurement; counters may omit it and count 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_field: Option<String>,

    /// Unit (UCUM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Event fields copied onto the measurement as attributes
    #[serde(default)]
    pub attributes: Vec<String>,
}

/// Log record emission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Enable log record emission
    pub enabled: bool,

    /// Signal whitelist; empty means every signal is logged
    pub signals: Vec<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            signals: Vec::new(),
        }
    }
}

/// Telemetry backend (OTLP) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtelSettings {
    /// OTLP endpoint URL
    /// For gRPC: http://localhost:4317
    /// For HTTP: http://localhost:4318
    pub endpoint: String,

    /// Protocol: grpc, http-proto, http-json
    pub protocol: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Enable gzip compression
    pub compression: bool,

    /// Custom headers
    pub headers: HashMap<String, String>,

    /// API key (convenience - added as x-api-key header)
    pub api_key: Option<String>,

    /// Bearer token (convenience - added to Authorization header)
    pub bearer_token: Option<String>,

    /// Service name for resource attributes
    pub service_name: String,

    /// Service version
    pub service_version: Option<String>,

    /// Additional resource attributes
    pub resource_attributes: HashMap<String, String>,

    /// Batch size for export
    pub batch_size: usize,

    /// Flush interval in milliseconds
    pub flush_interval_ms: u64,
}

impl Default for OtelSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4317".to_string(),
            protocol: "grpc".to_string(),
            timeout_ms: 10_000,
            compression: true,
            headers: HashMap::new(),
            api_key: None,
            bearer_token: None,
            service_name: "sigbridge".to_string(),
            service_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            resource_attributes: HashMap::new(),
            batch_size: 512,
            flush_interval_ms: 5_000,
        }
    }
}

/// One validated trace definition, immutable after construction
///
/// Produced by [`BridgeConfigFile::validate`]; the correlation engine
/// consumes these as-is and performs no validation of its own.
#[derive(Debug, Clone)]
pub struct TraceDefinition {
    /// Start signal name
    pub start_signal: String,

    /// End signal name
    pub end_signal: String,

    /// Field key holding the correlation value
    pub correlation_field: String,

    /// Resolved span name
    pub span_name: String,

    /// Pending-match timeout
    pub timeout: Duration,
}

/// One validated metric definition
#[derive(Debug, Clone)]
pub struct MetricDefinition {
    /// Signal whose events feed this instrument
    pub signal: String,

    /// Instrument identity and metadata
    pub instrument: InstrumentSpec,

    /// Field key holding the measurement; `None` counts 1 per event
    pub value_field: Option<String>,

    /// Event fields copied onto the measurement as attributes
    pub attributes: Vec<String>,
}

/// Validated bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The signal catalog the definitions were validated against
    pub registry: SignalRegistry,

    /// Immutable trace definition set
    pub traces: Vec<TraceDefinition>,

    /// Engine-wide trace options
    pub trace_options: TraceOptions,

    /// Metric definitions
    pub metrics: Vec<MetricDefinition>,

    /// Log settings
    pub logs: LogSettings,

    /// Telemetry backend settings
    pub otel: OtelSettings,
}

impl BridgeConfig {
    /// Parse and validate a TOML configuration string
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let raw: BridgeConfigFile = toml::from_str(content)?;
        raw.validate()
    }
}

impl BridgeConfigFile {
    /// Validate the raw configuration and produce the definition sets
    ///
    /// Everything the runtime assumes well-formed is rejected here: unknown
    /// signal references, non-string correlation fields, a definition whose
    /// start and end are the same signal, non-numeric measurement fields,
    /// unknown whitelist entries, and unknown OTLP protocols.
    pub fn validate(self) -> ConfigResult<BridgeConfig> {
        let registry = SignalRegistry::from_specs(self.signals.clone());

        let mut traces = Vec::with_capacity(self.traces.len());
        for t in &self.traces {
            let start = registry.get(&t.start).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "Trace references unknown start signal: {}",
                    t.start
                ))
            })?;
            let end = registry.get(&t.end).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "Trace references unknown end signal: {}",
                    t.end
                ))
            })?;
            if t.start == t.end {
                return Err(ConfigError::ValidationError(format!(
                    "Trace start and end must be different signals: {}",
                    t.start
                )));
            }
            for spec in [start, end] {
                match spec.field_kind(&t.correlation_field) {
                    Some(FieldKind::String) => {}
                    Some(kind) => {
                        return Err(ConfigError::ValidationError(format!(
                            "Correlation field {} on signal {} must be string, found {}",
                            t.correlation_field,
                            spec.name,
                            kind.as_str()
                        )))
                    }
                    None => {
                        return Err(ConfigError::ValidationError(format!(
                            "Signal {} has no field named {}",
                            spec.name, t.correlation_field
                        )))
                    }
                }
            }

            let timeout_ms = if t.timeout_ms == 0 {
                DEFAULT_TRACE_TIMEOUT_MS
            } else {
                t.timeout_ms
            };
            traces.push(TraceDefinition {
                start_signal: t.start.clone(),
                end_signal: t.end.clone(),
                correlation_field: t.correlation_field.clone(),
                span_name: t
                    .span_name
                    .clone()
                    .unwrap_or_else(|| t.start.clone()),
                timeout: Duration::from_millis(timeout_ms),
            });
        }

        let mut metrics = Vec::with_capacity(self.metrics.len());
        for m in &self.metrics {
            let spec = registry.get(&m.signal).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "Metric {} references unknown signal: {}",
                    m.name, m.signal
                ))
            })?;
            match &m.value_field {
                Some(field) => match spec.field_kind(field) {
                    Some(kind) => {
                        // Sums take integer fields; gauges and histograms
                        // take any numeric field.
                        let usable = match m.instrument {
                            InstrumentKind::Counter | InstrumentKind::UpDownCounter => {
                                kind == FieldKind::Int
                            }
                            InstrumentKind::Gauge | InstrumentKind::Histogram => {
                                kind.is_numeric()
                            }
                        };
                        if !usable {
                            return Err(ConfigError::ValidationError(format!(
                                "Metric {} value field {} must be numeric ({} for {}), found {}",
                                m.name,
                                field,
                                if matches!(
                                    m.instrument,
                                    InstrumentKind::Counter | InstrumentKind::UpDownCounter
                                ) {
                                    "int"
                                } else {
                                    "int or double"
                                },
                                m.instrument.as_str(),
                                kind.as_str()
                            )));
                        }
                    }
                    None => {
                        return Err(ConfigError::ValidationError(format!(
                            "Signal {} has no field named {}",
                            m.signal, field
                        )))
                    }
                },
                None => {
                    if m.instrument != InstrumentKind::Counter {
                        return Err(ConfigError::ValidationError(format!(
                            "Metric {} ({}) requires a value_field",
                            m.name,
                            m.instrument.as_str()
                        )));
                    }
                }
            }
            for attr in &m.attributes {
                if spec.field_kind(attr).is_none() {
                    return Err(ConfigError::ValidationError(format!(
                        "Metric {} attribute {} is not a field of signal {}",
                        m.name, attr, m.signal
                    )));
                }
            }
            metrics.push(MetricDefinition {
                signal: m.signal.clone(),
                instrument: InstrumentSpec {
                    name: m.name.clone(),
                    kind: m.instrument,
                    unit: m.unit.clone(),
                    description: m.description.clone(),
                },
                value_field: m.value_field.clone(),
                attributes: m.attributes.clone(),
            });
        }

        for name in &self.logs.signals {
            if !registry.contains(name) {
                return Err(ConfigError::ValidationError(format!(
                    "Log whitelist references unknown signal: {}",
                    name
                )));
            }
        }

        let valid_protocols = ["grpc", "http-proto", "http-json"];
        if !valid_protocols.contains(&self.otel.protocol.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid OTLP protocol: {}. Must be one of: {:?}",
                self.otel.protocol, valid_protocols
            )));
        }

        Ok(BridgeConfig {
            registry,
            traces,
            trace_options: self.trace_options,
            metrics,
            logs: self.logs,
            otel: self.otel,
        })
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Explicit config path, if the host application supplied one
    explicit_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            explicit_path: None,
        }
    }

    /// Set an explicit config path
    pub fn with_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. Explicit path
    /// 2. SIGBRIDGE_CONFIG environment variable
    /// 3. ~/.config/sigbridge/config.toml
    /// 4. /etc/sigbridge/config.toml
    /// 5. Default values
    pub fn load(&self) -> ConfigResult<BridgeConfig> {
        let config_path = self.find_config_file();

        let mut raw = if let Some(path) = config_path {
            info!("Loading configuration from: {}", path.display());
            self.load_from_file(&path)?
        } else {
            debug!("No config file found, using defaults");
            BridgeConfigFile::default()
        };

        self.apply_env_overrides(&mut raw);
        raw.validate()
    }

    /// Find the config file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("Explicit config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var("SIGBRIDGE_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("SIGBRIDGE_CONFIG path does not exist: {}", env_path);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("sigbridge").join("config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/sigbridge/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Load raw configuration from a TOML file
    fn load_from_file(&self, path: &Path) -> ConfigResult<BridgeConfigFile> {
        let content = std::fs::read_to_string(path)?;
        let raw: BridgeConfigFile = toml::from_str(&content)?;
        Ok(raw)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut BridgeConfigFile) {
        if let Ok(val) = std::env::var("SIGBRIDGE_OTEL_ENDPOINT") {
            config.otel.endpoint = val;
        }
        if let Ok(val) = std::env::var("SIGBRIDGE_OTEL_PROTOCOL") {
            config.otel.protocol = val;
        }
        if let Ok(val) = std::env::var("SIGBRIDGE_OTEL_API_KEY") {
            config.otel.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("SIGBRIDGE_SERVICE_NAME") {
            config.otel.service_name = val;
        }
        if let Ok(val) = std::env::var("SIGBRIDGE_LOGS_ENABLED") {
            config.logs.enabled = val.parse().unwrap_or(config.logs.enabled);
        }
    }

    /// Get the default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sigbridge").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper module for platform-specific directories
mod dirs {
    use std::path::PathBuf;

    /// Get the user's config directory
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        }

        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }

        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
        [[signals]]
        name = "request.started"
        fields = [
            { name = "request.id", type = "string" },
            { name = "method", type = "string" },
        ]

        [[signals]]
        name = "request.completed"
        fields = [
            { name = "request.id", type = "string" },
            { name = "status", type = "int" },
        ]

        [[signals]]
        name = "bytes.sent"
        fields = [
            { name = "bytes", type = "int" },
            { name = "endpoint", type = "string" },
        ]

        [[traces]]
        start = "request.started"
        end = "request.completed"
        correlation_field = "request.id"
        span_name = "http.request"
        timeout_ms = 120000

        [trace_options]
        sweep_interval_ms = 30000
        context_attributes = ["tenant.id"]

        [[metrics]]
        signal = "bytes.sent"
        name = "app.bytes_sent"
        instrument = "counter"
        value_field = "bytes"
        unit = "By"
        attributes = ["endpoint"]

        [logs]
        enabled = true
        signals = ["request.completed"]

        [otel]
        endpoint = "http://collector:4317"
        protocol = "grpc"
    "#;

    #[test]
    fn default_config_validates() {
        let config = BridgeConfigFile::default().validate().unwrap();
        assert!(config.traces.is_empty());
        assert!(config.metrics.is_empty());
        assert!(config.logs.enabled);
        assert_eq!(config.otel.endpoint, "http://localhost:4317");
        assert_eq!(
            config.trace_options.sweep_interval(),
            Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS)
        );
    }

    #[test]
    fn parse_full_toml() {
        let config = BridgeConfig::from_toml_str(FULL_CONFIG).unwrap();
        assert_eq!(config.traces.len(), 1);
        let def = &config.traces[0];
        assert_eq!(def.span_name, "http.request");
        assert_eq!(def.timeout, Duration::from_millis(120_000));
        assert_eq!(config.metrics.len(), 1);
        assert_eq!(config.metrics[0].instrument.name, "app.bytes_sent");
        assert_eq!(config.logs.signals, vec!["request.completed"]);
        assert_eq!(config.otel.endpoint, "http://collector:4317");
        assert_eq!(
            config.trace_options.context_attributes,
            vec!["tenant.id".to_string()]
        );
    }

    #[test]
    fn span_name_defaults_to_start_signal() {
        let toml_str = r#"
            [[signals]]
            name = "db.query.started"
            fields = [{ name = "query.id", type = "string" }]

            [[signals]]
            name = "db.query.finished"
            fields = [{ name = "query.id", type = "string" }]

            [[traces]]
            start = "db.query.started"
            end = "db.query.finished"
            correlation_field = "query.id"
        "#;
        let config = BridgeConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.traces[0].span_name, "db.query.started");
        assert_eq!(
            config.traces[0].timeout,
            Duration::from_millis(DEFAULT_TRACE_TIMEOUT_MS)
        );
    }

    #[test]
    fn rejects_unknown_signal_reference() {
        let toml_str = r#"
            [[signals]]
            name = "request.started"
            fields = [{ name = "request.id", type = "string" }]

            [[traces]]
            start = "request.started"
            end = "request.vanished"
            correlation_field = "request.id"
        "#;
        let err = BridgeConfig::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn rejects_non_string_correlation_field() {
        let toml_str = r#"
            [[signals]]
            name = "a"
            fields = [{ name = "seq", type = "int" }]

            [[signals]]
            name = "b"
            fields = [{ name = "seq", type = "int" }]

            [[traces]]
            start = "a"
            end = "b"
            correlation_field = "seq"
        "#;
        let err = BridgeConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("must be string"));
    }

    #[test]
    fn rejects_same_start_and_end() {
        let toml_str = r#"
            [[signals]]
            name = "tick"
            fields = [{ name = "id", type = "string" }]

            [[traces]]
            start = "tick"
            end = "tick"
            correlation_field = "id"
        "#;
        let err = BridgeConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("different signals"));
    }

    #[test]
    fn rejects_non_numeric_metric_value_field() {
        let toml_str = r#"
            [[signals]]
            name = "bytes.sent"
            fields = [{ name = "endpoint", type = "string" }]

            [[metrics]]
            signal = "bytes.sent"
            name = "app.bytes_sent"
            instrument = "histogram"
            value_field = "endpoint"
        "#;
        let err = BridgeConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("must be numeric"));
    }

    #[test]
    fn rejects_valueless_non_counter() {
        let toml_str = r#"
            [[signals]]
            name = "queue.depth"
            fields = [{ name = "depth", type = "int" }]

            [[metrics]]
            signal = "queue.depth"
            name = "app.queue_depth"
            instrument = "gauge"
        "#;
        let err = BridgeConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("requires a value_field"));
    }

    #[test]
    fn rejects_unknown_log_whitelist_entry() {
        let toml_str = r#"
            [logs]
            signals = ["no.such.signal"]
        "#;
        let err = BridgeConfig::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn rejects_invalid_otlp_protocol() {
        let toml_str = r#"
            [otel]
            protocol = "carrier-pigeon"
        "#;
        let err = BridgeConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("Invalid OTLP protocol"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, FULL_CONFIG).unwrap();

        let config = ConfigLoader::new().with_path(Some(path)).load().unwrap();
        assert_eq!(config.traces.len(), 1);
    }
}
