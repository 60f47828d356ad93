use std::fs;
use std::num::NonZeroU64;
use std::path::PathBuf;

use crate::config::Configuration;
use crate::error::{ProfilerError, Result};
use crate::period::PeriodUnit;
use crate::profiler::{ProfilerStrategy, Recorder};
use crate::sink::GaugeBatch;
use crate::telemetry::tags;

pub const CONFIG_STATUS_PATH: &str = "memory_status_path";
pub const CONFIG_PERIOD_MS: &str = "memory_period_ms";
pub const CONFIG_EMIT_BOUNDS: &str = "memory_emit_bounds";

const DEFAULT_STATUS_PATH: &str = "/proc/self/status";
const DEFAULT_PERIOD_MS: NonZeroU64 = NonZeroU64::new(10_000).unwrap();

/// Process-level memory usage sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessMemorySample {
    /// Resident Set Size (physical memory) in bytes.
    pub rss_bytes: Option<u64>,
    /// Virtual memory size in bytes.
    pub virtual_bytes: Option<u64>,
}

/// Parses `VmRSS`/`VmSize` out of a procfs `status` document.
pub fn parse_status(contents: &str) -> ProcessMemorySample {
    ProcessMemorySample {
        rss_bytes: parse_kib_field(contents, "VmRSS:"),
        virtual_bytes: parse_kib_field(contents, "VmSize:"),
    }
}

fn parse_kib_field(status: &str, field: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with(field))?;
    let value_kib = line
        .split_whitespace()
        .nth(1)
        .and_then(|value| value.parse::<u64>().ok())?;

    value_kib.checked_mul(1024)
}

/// Reference profiler reporting process memory from procfs.
///
/// Each tick emits one tagged batch with resident and virtual size. When
/// bounds are enabled, flush emits the resident-size extremes seen.
#[derive(Debug, Clone)]
pub struct MemoryProfiler {
    status_path: PathBuf,
    period_ms: NonZeroU64,
    emit_bounds: Option<bool>,
    rss_max: Option<u64>,
    rss_min: Option<u64>,
}

impl MemoryProfiler {
    pub fn new() -> Self {
        Self {
            status_path: PathBuf::from(DEFAULT_STATUS_PATH),
            period_ms: DEFAULT_PERIOD_MS,
            emit_bounds: None,
            rss_max: None,
            rss_min: None,
        }
    }

    pub fn status_path(&self) -> &PathBuf {
        &self.status_path
    }

    fn read_sample(&self) -> Result<ProcessMemorySample> {
        let contents = fs::read_to_string(&self.status_path).map_err(|err| {
            ProfilerError::Sampling(format!(
                "failed to read {}: {err}",
                self.status_path.display()
            ))
        })?;
        Ok(parse_status(&contents))
    }
}

impl Default for MemoryProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfilerStrategy for MemoryProfiler {
    fn handle_arguments(&mut self, config: &Configuration) -> Result<()> {
        if let Some(path) = config.get(CONFIG_STATUS_PATH) {
            self.status_path = PathBuf::from(path);
        }
        if let Some(period_ms) = config.get_parsed::<u64>(CONFIG_PERIOD_MS)? {
            self.period_ms = NonZeroU64::new(period_ms).ok_or_else(|| {
                ProfilerError::configuration(CONFIG_PERIOD_MS, "period must be positive")
            })?;
        }
        self.emit_bounds = config.get_parsed::<bool>(CONFIG_EMIT_BOUNDS)?;
        Ok(())
    }

    fn sample(&mut self, recorder: &Recorder) -> Result<()> {
        let sample = self.read_sample()?;

        let mut gauges = GaugeBatch::new();
        if let Some(rss) = sample.rss_bytes {
            gauges.insert(tags::METRIC_MEMORY_RSS_BYTES.to_owned(), rss.into());
            self.rss_max = Some(self.rss_max.map_or(rss, |max| max.max(rss)));
            self.rss_min = Some(self.rss_min.map_or(rss, |min| min.min(rss)));
        }
        if let Some(virtual_bytes) = sample.virtual_bytes {
            gauges.insert(
                tags::METRIC_MEMORY_VIRTUAL_BYTES.to_owned(),
                virtual_bytes.into(),
            );
        }

        if gauges.is_empty() {
            return Err(ProfilerError::Sampling(format!(
                "no memory fields found in {}",
                self.status_path.display()
            )));
        }
        recorder.record_gauges(&gauges);
        Ok(())
    }

    fn flush(&mut self, recorder: &Recorder) -> Result<()> {
        if !self.emit_bounds(recorder.sink_emits_bounds()) {
            return Ok(());
        }

        if let (Some(max), Some(min)) = (self.rss_max, self.rss_min) {
            let mut bounds = GaugeBatch::new();
            bounds.insert(tags::METRIC_MEMORY_RSS_MAX_BYTES.to_owned(), max.into());
            bounds.insert(tags::METRIC_MEMORY_RSS_MIN_BYTES.to_owned(), min.into());
            recorder.record_gauges(&bounds);
        }
        Ok(())
    }

    fn period(&self) -> NonZeroU64 {
        self.period_ms
    }

    fn period_unit(&self) -> PeriodUnit {
        PeriodUnit::Milliseconds
    }

    fn emit_bounds(&self, sink_preference: bool) -> bool {
        self.emit_bounds.unwrap_or(sink_preference)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
