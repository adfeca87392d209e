//! Mechanical signal-to-telemetry translation for sigbridge
//!
//! The non-correlating paths of the bridge: events become counter, gauge,
//! and histogram measurements or structured log records by declarative
//! type-directed dispatch. No state machines here - every event is handled
//! in isolation.

pub mod logs;
pub mod metrics;

pub use logs::LogMapper;
pub use metrics::MetricMapper;
