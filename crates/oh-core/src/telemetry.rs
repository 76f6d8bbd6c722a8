//! Metrics sink passed explicitly into the client
//!
//! All methods default to no-ops so implementors only override what they
//! record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::EventKind;

/// Receiver for runtime counters
pub trait Telemetry: Send + Sync + 'static {
    /// An event was decoded from the stream
    fn event_received(&self, _kind: EventKind) {}

    /// A frame for a known event type could not be decoded
    fn decode_failed(&self) {}

    /// A reconnect attempt was scheduled after `delay`
    fn reconnect_scheduled(&self, _delay: Duration) {}

    /// A rule body started running
    fn rule_started(&self, _rule_id: &str) {}

    /// A rule body panicked
    fn rule_panicked(&self, _rule_id: &str) {}
}

/// Shared handle to a telemetry sink
pub type SharedTelemetry = Arc<dyn Telemetry>;

/// Telemetry sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {}

/// Telemetry sink keeping plain counters
#[derive(Debug, Default)]
pub struct CountingTelemetry {
    events_received: AtomicU64,
    decode_failures: AtomicU64,
    reconnects: AtomicU64,
    rule_runs: AtomicU64,
    rule_panics: AtomicU64,
}

impl CountingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn rule_runs(&self) -> u64 {
        self.rule_runs.load(Ordering::Relaxed)
    }

    pub fn rule_panics(&self) -> u64 {
        self.rule_panics.load(Ordering::Relaxed)
    }
}

impl Telemetry for CountingTelemetry {
    fn event_received(&self, _kind: EventKind) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn reconnect_scheduled(&self, _delay: Duration) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn rule_started(&self, _rule_id: &str) {
        self.rule_runs.fetch_add(1, Ordering::Relaxed);
    }

    fn rule_panicked(&self, _rule_id: &str) {
        self.rule_panics.fetch_add(1, Ordering::Relaxed);
    }
}
