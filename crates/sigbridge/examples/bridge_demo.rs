//! Wires a bridge to a local OTLP collector and feeds it a handful of
//! events: a correlated request pair, a counter signal, and a whitelisted
//! log signal.
//!
//! Run against a collector listening on localhost:4317:
//!
//! ```sh
//! cargo run --example bridge_demo
//! ```

use sigbridge::{
    BridgeConfig, EventContext, FieldValue, Signal, SignalEvent, TelemetryBridge,
    TelemetryProviders, TracingDiagnostics,
};
use std::sync::Arc;

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
    name = "demo.requests"
    instrument = "counter"

    [logs]
    enabled = true
    signals = ["request.completed"]

    [otel]
    endpoint = "http://localhost:4317"
    protocol = "grpc"
    service_name = "sigbridge-demo"
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sigbridge=debug".into()),
        )
        .init();

    let config = BridgeConfig::from_toml_str(CONFIG)?;
    let providers = TelemetryProviders::init(&config.otel)?;

    let bridge = TelemetryBridge::builder()
        .span_sink(providers.span_sink())
        .metric_sink(providers.metric_sink())
        .log_sink(providers.log_sink())
        .diagnostics(Arc::new(TracingDiagnostics))
        .build(config)?;

    let ctx = EventContext::new();
    let started = SignalEvent::new(Signal::new("request.started"))
        .with_field("request.id", "REQ-1".into());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let completed = SignalEvent::new(Signal::new("request.completed"))
        .with_field("request.id", "REQ-1".into())
        .with_field("status", FieldValue::Int(200));

    bridge.observe(&ctx, &started).await;
    bridge.observe(&ctx, &completed).await;

    bridge.shutdown().await;
    providers.shutdown();
    Ok(())
}
