//! Trace correlation for the sigbridge telemetry bridge
//!
//! Matches configured start/end signal pairs into spans, in either arrival
//! order, keyed by an application-supplied correlation value scoped to the
//! signal pair. Correlation is purely local and in-memory; nothing here
//! survives a process restart, and nothing crosses process boundaries.

mod engine;

pub use engine::{TraceEngine, REASON_END_NOT_RECEIVED, REASON_START_NOT_RECEIVED};
