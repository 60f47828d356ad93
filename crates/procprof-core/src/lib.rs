pub mod config;
pub mod error;
pub mod identity;
pub mod period;
pub mod profiler;
pub mod profilers;
pub mod scheduler;
pub mod sink;
pub mod telemetry;

pub use config::Configuration;
pub use error::{ProfilerError, Result};
pub use identity::{EnvIdentitySource, IdentitySource, TagSet, TagSetBuilder, application_id};
pub use period::PeriodUnit;
pub use profiler::{
    LifecycleState, Profiler, ProfilerBuilder, ProfilerStrategy, Recorder, StatsHandle,
};
pub use profilers::MemoryProfiler;
pub use scheduler::{ProfilerReport, Scheduler, SchedulerHandle, ShutdownReport};
pub use sink::{GaugeBatch, GaugeValue, InMemorySink, MetricsSink, SinkSnapshot, TracingSink};
