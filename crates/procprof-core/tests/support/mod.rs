#![allow(dead_code)]

use std::num::NonZeroU64;
use std::sync::{Arc, Mutex};

use procprof_core::{Configuration, PeriodUnit, ProfilerError, ProfilerStrategy, Recorder, Result};

pub const CONTAINER_ID: &str = "container_e273_1510780065801_7737_01_000042";

/// Identity source returning a fixed container id.
pub fn fixed_identity(value: &'static str) -> impl Fn() -> Option<String> + Send + Sync {
    move || Some(value.to_owned())
}

pub fn no_identity() -> Option<String> {
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleBehavior {
    Record,
    Fail,
    Panic,
}

/// Strategy that logs every hook invocation.
#[derive(Debug, Clone)]
pub struct MockProfiler {
    pub events: Arc<Mutex<Vec<String>>>,
    pub period: NonZeroU64,
    pub unit: PeriodUnit,
    pub bounds_override: Option<bool>,
    pub reject_arguments: bool,
    pub behavior: SampleBehavior,
    pub panic_on_flush: bool,
}

impl MockProfiler {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            period: NonZeroU64::MIN,
            unit: PeriodUnit::Minutes,
            bounds_override: None,
            reject_arguments: false,
            behavior: SampleBehavior::Record,
            panic_on_flush: false,
        }
    }

    pub fn with_period(mut self, period: u64, unit: PeriodUnit) -> Self {
        self.period = NonZeroU64::new(period).expect("period must be positive");
        self.unit = unit;
        self
    }

    pub fn with_behavior(mut self, behavior: SampleBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("mock events lock poisoned").clone()
    }

    fn push(&self, event: &str) {
        self.events
            .lock()
            .expect("mock events lock poisoned")
            .push(event.to_owned());
    }
}

impl ProfilerStrategy for MockProfiler {
    fn handle_arguments(&mut self, _config: &Configuration) -> Result<()> {
        self.push("handle_arguments");
        if self.reject_arguments {
            return Err(ProfilerError::configuration("mock_setting", "rejected by mock"));
        }
        Ok(())
    }

    fn sample(&mut self, recorder: &Recorder) -> Result<()> {
        self.push("sample");
        match self.behavior {
            SampleBehavior::Record => {
                recorder.record_gauge("mock.samples", 1);
                Ok(())
            }
            SampleBehavior::Fail => Err(ProfilerError::Sampling("mock failure".to_owned())),
            SampleBehavior::Panic => panic!("mock panic"),
        }
    }

    fn flush(&mut self, _recorder: &Recorder) -> Result<()> {
        self.push("flush");
        if self.panic_on_flush {
            panic!("mock flush panic");
        }
        Ok(())
    }

    fn period(&self) -> NonZeroU64 {
        self.period
    }

    fn period_unit(&self) -> PeriodUnit {
        self.unit
    }

    fn emit_bounds(&self, sink_preference: bool) -> bool {
        self.bounds_override.unwrap_or(sink_preference)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
