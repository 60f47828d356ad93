use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::{GaugeBatch, GaugeValue, MetricsSink};

/// One scalar gauge call received by an [`InMemorySink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub key: String,
    pub value: GaugeValue,
}

/// One batched gauge call received by an [`InMemorySink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub values: GaugeBatch,
    pub tags: Vec<String>,
}

/// Point-in-time copy of everything an [`InMemorySink`] has received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkSnapshot {
    /// Scalar calls in arrival order.
    pub scalars: Vec<ScalarRecord>,
    /// Batched calls in arrival order.
    pub batches: Vec<BatchRecord>,
    /// Latest value per gauge name across both paths.
    pub gauges: BTreeMap<String, GaugeValue>,
}

impl SinkSnapshot {
    pub fn gauge(&self, name: &str) -> Option<GaugeValue> {
        self.gauges.get(name).copied()
    }

    /// Total number of sink calls observed.
    pub fn calls(&self) -> usize {
        self.scalars.len() + self.batches.len()
    }
}

/// Sink that keeps every measurement in memory.
///
/// Used by tests and for diagnostics when no remote backend is configured.
#[derive(Debug)]
pub struct InMemorySink {
    emit_bounds: bool,
    store: Mutex<SinkSnapshot>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::with_emit_bounds(true)
    }

    pub fn with_emit_bounds(emit_bounds: bool) -> Self {
        Self {
            emit_bounds,
            store: Mutex::new(SinkSnapshot::default()),
        }
    }

    pub fn snapshot(&self) -> SinkSnapshot {
        lock_unpoisoned(&self.store).clone()
    }

    pub fn reset(&self) {
        *lock_unpoisoned(&self.store) = SinkSnapshot::default();
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for InMemorySink {
    fn record_gauge_value(&self, key: &str, value: GaugeValue) {
        let mut store = lock_unpoisoned(&self.store);
        store.scalars.push(ScalarRecord {
            key: key.to_owned(),
            value,
        });
        store.gauges.insert(key.to_owned(), value);
    }

    fn record_gauge_values(&self, values: &GaugeBatch, tags: &[String]) {
        let mut store = lock_unpoisoned(&self.store);
        for (key, value) in values {
            store.gauges.insert(key.clone(), *value);
        }
        store.batches.push(BatchRecord {
            values: values.clone(),
            tags: tags.to_vec(),
        });
    }

    fn emit_bounds(&self) -> bool {
        self.emit_bounds
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
