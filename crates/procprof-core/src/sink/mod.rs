use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod logging;
pub mod memory;

pub use logging::TracingSink;
pub use memory::{BatchRecord, InMemorySink, ScalarRecord, SinkSnapshot};

/// Numeric value of a gauge measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GaugeValue {
    Int(i64),
    Float(f64),
}

impl GaugeValue {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }
}

impl fmt::Display for GaugeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
        }
    }
}

macro_rules! gauge_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for GaugeValue {
                fn from(value: $ty) -> Self {
                    Self::Int(i64::from(value))
                }
            }
        )*
    };
}

gauge_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for GaugeValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(value) => Self::Int(value),
            Err(_) => Self::Float(value as f64),
        }
    }
}

impl From<usize> for GaugeValue {
    fn from(value: usize) -> Self {
        Self::from(value as u64)
    }
}

impl From<f32> for GaugeValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for GaugeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Gauge name to value mapping submitted in one batched call.
pub type GaugeBatch = BTreeMap<String, GaugeValue>;

/// Destination for profiler measurements.
///
/// A sink is shared by every profiler in the process and outlives them; it is
/// responsible for its own buffering, retries and thread-safety. Recording
/// calls are fire-and-forget.
pub trait MetricsSink: Send + Sync {
    /// Records one untagged scalar gauge.
    fn record_gauge_value(&self, key: &str, value: GaugeValue);

    /// Records a batch of gauges carrying the profiler's identity tags.
    fn record_gauge_values(&self, values: &GaugeBatch, tags: &[String]);

    /// Whether upper/lower bound series should be emitted.
    ///
    /// Useful for backends without rich query languages; sinks that can derive
    /// bounds themselves return false.
    fn emit_bounds(&self) -> bool {
        true
    }
}
