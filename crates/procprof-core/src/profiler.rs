//! The profiler contract.
//!
//! Concrete profilers implement [`ProfilerStrategy`]; a [`Profiler`] runner
//! owns the strategy together with a [`Recorder`] that bridges measurements to
//! the shared [`MetricsSink`]. The runner spawns nothing: an external scheduler
//! reads [`Profiler::interval`], calls [`Profiler::sample`] on that cadence and
//! [`Profiler::flush`] once at shutdown.

use std::any::Any;
use std::fmt;
use std::num::NonZeroU64;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::Configuration;
use crate::error::{ProfilerError, Result};
use crate::identity::{EnvIdentitySource, IdentitySource, TagSet, TagSetBuilder};
use crate::period::PeriodUnit;
use crate::sink::{GaugeBatch, GaugeValue, MetricsSink};
use crate::telemetry::{self, tags};

/// Hooks every concrete profiler supplies.
pub trait ProfilerStrategy: Send {
    /// Validates and extracts strategy settings. Called once, during
    /// construction, before identity tags are derived.
    fn handle_arguments(&mut self, config: &Configuration) -> Result<()>;

    /// Performs one profiling pass.
    fn sample(&mut self, recorder: &Recorder) -> Result<()>;

    /// Emits anything still buffered. Called once, after the last sample.
    fn flush(&mut self, recorder: &Recorder) -> Result<()>;

    fn period(&self) -> NonZeroU64;

    fn period_unit(&self) -> PeriodUnit;

    /// Decides whether bound series are emitted given the sink's preference.
    fn emit_bounds(&self, sink_preference: bool) -> bool {
        sink_preference
    }

    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

impl ProfilerStrategy for Box<dyn ProfilerStrategy> {
    fn handle_arguments(&mut self, config: &Configuration) -> Result<()> {
        (**self).handle_arguments(config)
    }

    fn sample(&mut self, recorder: &Recorder) -> Result<()> {
        (**self).sample(recorder)
    }

    fn flush(&mut self, recorder: &Recorder) -> Result<()> {
        (**self).flush(recorder)
    }

    fn period(&self) -> NonZeroU64 {
        (**self).period()
    }

    fn period_unit(&self) -> PeriodUnit {
        (**self).period_unit()
    }

    fn emit_bounds(&self, sink_preference: bool) -> bool {
        (**self).emit_bounds(sink_preference)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Recording API handed to strategy hooks.
///
/// Every call bumps the recorded-stats counter by exactly one, regardless of
/// how many gauges a batch holds.
pub struct Recorder {
    sink: Arc<dyn MetricsSink>,
    tags: TagSet,
    recorded_stats: Arc<AtomicU64>,
}

impl Recorder {
    pub fn new(sink: Arc<dyn MetricsSink>, tags: TagSet) -> Self {
        Self {
            sink,
            tags,
            recorded_stats: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a single gauge. Identity tags are not attached on this path.
    pub fn record_gauge(&self, key: &str, value: impl Into<GaugeValue>) {
        self.recorded_stats.fetch_add(1, Ordering::AcqRel);
        self.sink.record_gauge_value(key, value.into());
    }

    /// Records a batch of gauges tagged with the identity tag set.
    pub fn record_gauges(&self, values: &GaugeBatch) {
        self.recorded_stats.fetch_add(1, Ordering::AcqRel);
        self.sink.record_gauge_values(values, self.tags.as_slice());
    }

    pub fn recorded_stats(&self) -> u64 {
        self.recorded_stats.load(Ordering::Acquire)
    }

    pub fn sink_emits_bounds(&self) -> bool {
        self.sink.emit_bounds()
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("tags", &self.tags)
            .field("recorded_stats", &self.recorded_stats())
            .finish_non_exhaustive()
    }
}

/// Thread-safe read-only view of a profiler's counters.
#[derive(Debug, Clone)]
pub struct StatsHandle {
    recorded_stats: Arc<AtomicU64>,
    samples: Arc<AtomicU64>,
    sampling_failures: Arc<AtomicU64>,
}

impl StatsHandle {
    pub fn recorded_stats(&self) -> u64 {
        self.recorded_stats.load(Ordering::Acquire)
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Acquire)
    }

    pub fn sampling_failures(&self) -> u64 {
        self.sampling_failures.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed,
    Sampling,
    Flushed,
}

/// Runner binding a strategy to its recorder and lifecycle.
pub struct Profiler<S = Box<dyn ProfilerStrategy>> {
    strategy: S,
    recorder: Recorder,
    state: LifecycleState,
    samples: Arc<AtomicU64>,
    sampling_failures: Arc<AtomicU64>,
}

impl<S: ProfilerStrategy> Profiler<S> {
    /// Constructs a profiler whose identity comes from the process environment.
    pub fn new(sink: Arc<dyn MetricsSink>, config: &Configuration, strategy: S) -> Result<Self> {
        Self::with_identity_source(sink, config, strategy, &EnvIdentitySource::default())
    }

    pub fn with_identity_source(
        sink: Arc<dyn MetricsSink>,
        config: &Configuration,
        mut strategy: S,
        identity: &dyn IdentitySource,
    ) -> Result<Self> {
        if let Err(error) = strategy.handle_arguments(config) {
            tracing::error!(
                target: tags::TARGET_PROFILER,
                op = "construct",
                profiler = strategy.name(),
                %error,
                "profiler rejected its arguments"
            );
            return Err(error);
        }

        let tag_set = TagSetBuilder::new(identity).build(config)?;
        tracing::debug!(
            target: tags::TARGET_PROFILER,
            op = "construct",
            profiler = strategy.name(),
            tags = %tag_set,
            "profiler constructed"
        );

        Ok(Self {
            strategy,
            recorder: Recorder::new(sink, tag_set),
            state: LifecycleState::Constructed,
            samples: Arc::new(AtomicU64::new(0)),
            sampling_failures: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn builder(strategy: S) -> ProfilerBuilder<S> {
        ProfilerBuilder::new(strategy)
    }

    /// Runs one sampling pass.
    ///
    /// Errors and panics from the strategy are logged and counted, never
    /// propagated, so a periodic caller keeps ticking.
    pub fn sample(&mut self) {
        match self.state {
            LifecycleState::Flushed => {
                tracing::warn!(
                    target: tags::TARGET_PROFILER,
                    op = "sample",
                    profiler = self.strategy.name(),
                    "sample requested after flush; ignoring"
                );
                return;
            }
            LifecycleState::Constructed => self.state = LifecycleState::Sampling,
            LifecycleState::Sampling => {}
        }

        let started_at = Instant::now();
        let recorder = &self.recorder;
        let strategy = &mut self.strategy;
        let result = match catch_unwind(AssertUnwindSafe(|| strategy.sample(recorder))) {
            Ok(result) => result,
            Err(payload) => Err(ProfilerError::Sampling(format!(
                "sample hook panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };
        let elapsed_us = telemetry::elapsed_us(started_at);
        self.samples.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(()) => tracing::debug!(
                target: tags::TARGET_PROFILER,
                op = "sample",
                result = "ok",
                profiler = self.strategy.name(),
                elapsed_us,
                "sample completed"
            ),
            Err(error) => {
                self.sampling_failures.fetch_add(1, Ordering::AcqRel);
                tracing::warn!(
                    target: tags::TARGET_PROFILER,
                    op = "sample",
                    result = "error",
                    profiler = self.strategy.name(),
                    elapsed_us,
                    %error,
                    "sample failed"
                );
            }
        }
    }

    /// Flushes buffered measurements. Only the first call reaches the strategy.
    pub fn flush(&mut self) -> Result<()> {
        if self.state == LifecycleState::Flushed {
            tracing::warn!(
                target: tags::TARGET_PROFILER,
                op = "flush",
                profiler = self.strategy.name(),
                "profiler already flushed; ignoring"
            );
            return Ok(());
        }
        self.state = LifecycleState::Flushed;

        let recorder = &self.recorder;
        let strategy = &mut self.strategy;
        let result = match catch_unwind(AssertUnwindSafe(|| strategy.flush(recorder))) {
            Ok(result) => result,
            Err(payload) => Err(ProfilerError::Flush(format!(
                "flush hook panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        let outcome = if result.is_ok() { "ok" } else { "error" };
        tracing::debug!(
            target: tags::TARGET_PROFILER,
            op = "flush",
            result = outcome,
            profiler = self.strategy.name(),
            recorded_stats = self.recorder.recorded_stats(),
            "profiler flushed"
        );

        result.map_err(|error| error.with_context(format!("flushing `{}`", self.strategy.name())))
    }

    pub fn period(&self) -> NonZeroU64 {
        self.strategy.period()
    }

    pub fn period_unit(&self) -> PeriodUnit {
        self.strategy.period_unit()
    }

    /// Sampling interval derived from [`Self::period`] and [`Self::period_unit`].
    pub fn interval(&self) -> Duration {
        self.period_unit().to_duration(self.period().get())
    }

    pub fn emit_bounds_metrics(&self) -> bool {
        self.strategy.emit_bounds(self.recorder.sink_emits_bounds())
    }

    pub fn recorded_stats(&self) -> u64 {
        self.recorder.recorded_stats()
    }

    pub fn sampling_failures(&self) -> u64 {
        self.sampling_failures.load(Ordering::Acquire)
    }

    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle {
            recorded_stats: Arc::clone(&self.recorder.recorded_stats),
            samples: Arc::clone(&self.samples),
            sampling_failures: Arc::clone(&self.sampling_failures),
        }
    }

    pub fn tags(&self) -> &TagSet {
        self.recorder.tags()
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn name(&self) -> &str {
        self.strategy.name()
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }
}

impl<S: ProfilerStrategy + 'static> Profiler<S> {
    /// Erases the strategy type so profilers of different kinds can share a scheduler.
    pub fn into_dyn(self) -> Profiler {
        Profiler {
            strategy: Box::new(self.strategy),
            recorder: self.recorder,
            state: self.state,
            samples: self.samples,
            sampling_failures: self.sampling_failures,
        }
    }
}

impl<S: ProfilerStrategy> fmt::Debug for Profiler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiler")
            .field("name", &self.strategy.name())
            .field("state", &self.state)
            .field("recorder", &self.recorder)
            .finish_non_exhaustive()
    }
}

/// Step-wise construction of a [`Profiler`].
///
/// Unlike [`Profiler::new`], the sink is optional until [`Self::build`], which
/// fails with [`ProfilerError::InvalidArgument`] when none was supplied.
pub struct ProfilerBuilder<S> {
    strategy: S,
    sink: Option<Arc<dyn MetricsSink>>,
    config: Configuration,
    identity: Option<Box<dyn IdentitySource>>,
}

impl<S: ProfilerStrategy> ProfilerBuilder<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            sink: None,
            config: Configuration::default(),
            identity: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_config(mut self, config: Configuration) -> Self {
        self.config = config;
        self
    }

    pub fn with_identity_source(mut self, identity: impl IdentitySource + 'static) -> Self {
        self.identity = Some(Box::new(identity));
        self
    }

    pub fn build(self) -> Result<Profiler<S>> {
        let sink = self
            .sink
            .ok_or(ProfilerError::InvalidArgument("a metrics sink is required"))?;
        match self.identity {
            Some(identity) => {
                Profiler::with_identity_source(sink, &self.config, self.strategy, &*identity)
            }
            None => Profiler::new(sink, &self.config, self.strategy),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
