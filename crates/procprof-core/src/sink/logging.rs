use std::sync::atomic::{AtomicU64, Ordering};

use super::{GaugeBatch, GaugeValue, MetricsSink};
use crate::telemetry::tags;

/// Sink that reports every measurement as a `tracing` event.
#[derive(Debug)]
pub struct TracingSink {
    emit_bounds: bool,
    events: AtomicU64,
}

impl TracingSink {
    pub fn new(emit_bounds: bool) -> Self {
        Self {
            emit_bounds,
            events: AtomicU64::new(0),
        }
    }

    /// Number of sink calls logged so far.
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Acquire)
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MetricsSink for TracingSink {
    fn record_gauge_value(&self, key: &str, value: GaugeValue) {
        self.events.fetch_add(1, Ordering::AcqRel);
        tracing::info!(
            target: tags::TARGET_SINK,
            op = "gauge",
            key,
            value = %value,
            "gauge recorded"
        );
    }

    fn record_gauge_values(&self, values: &GaugeBatch, tag_set: &[String]) {
        self.events.fetch_add(1, Ordering::AcqRel);
        for (key, value) in values {
            tracing::info!(
                target: tags::TARGET_SINK,
                op = "gauges",
                key = key.as_str(),
                value = %value,
                tags = ?tag_set,
                "gauge recorded"
            );
        }
    }

    fn emit_bounds(&self) -> bool {
        self.emit_bounds
    }
}
