mod support;

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use procprof_core::profilers::memory::{CONFIG_PERIOD_MS, CONFIG_STATUS_PATH};
use procprof_core::telemetry::tags;
use procprof_core::{
    Configuration, GaugeValue, InMemorySink, MemoryProfiler, PeriodUnit, Profiler, Scheduler,
    StatsHandle,
};
use support::{MockProfiler, SampleBehavior, fixed_identity, no_identity};
use tempfile::NamedTempFile;

fn wait_for_samples(stats: &StatsHandle, at_least: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while stats.samples() < at_least {
        assert!(Instant::now() < deadline, "profiler was not sampled in time");
        thread::sleep(Duration::from_millis(1));
    }
}

fn mock_profiler(strategy: MockProfiler) -> Profiler<MockProfiler> {
    Profiler::with_identity_source(
        Arc::new(InMemorySink::new()),
        &Configuration::default(),
        strategy,
        &no_identity,
    )
    .expect("mock profiler should construct")
}

#[test]
fn samples_periodically_and_flushes_once_at_shutdown() {
    let strategy = MockProfiler::new().with_period(1, PeriodUnit::Milliseconds);
    let events = Arc::clone(&strategy.events);

    let mut scheduler = Scheduler::new();
    let stats = scheduler.register(mock_profiler(strategy));
    let handle = scheduler.start().expect("scheduler should start");

    wait_for_samples(&stats, 3);
    let report = handle.shutdown();

    assert!(report.is_clean());
    let profiler = report.profiler("mock").expect("mock report missing");
    assert!(profiler.samples >= 3);
    assert_eq!(profiler.recorded_stats, profiler.samples);

    let events = events.lock().expect("mock events lock poisoned").clone();
    assert_eq!(events.first().map(String::as_str), Some("handle_arguments"));
    assert_eq!(events.last().map(String::as_str), Some("flush"));
    assert_eq!(events.iter().filter(|event| *event == "flush").count(), 1);
}

#[test]
fn first_sample_happens_without_waiting_a_period() {
    // A one-minute period would time out the test if the first tick waited.
    let mut scheduler = Scheduler::new();
    let stats = scheduler.register(mock_profiler(MockProfiler::new()));
    let handle = scheduler.start().expect("scheduler should start");

    wait_for_samples(&stats, 1);
    let report = handle.shutdown();
    assert_eq!(report.profilers[0].samples, 1);
}

#[test]
fn failing_profiler_keeps_ticking() {
    let mut scheduler = Scheduler::new();
    let stats = scheduler.register(mock_profiler(
        MockProfiler::new()
            .with_period(1, PeriodUnit::Milliseconds)
            .with_behavior(SampleBehavior::Fail),
    ));
    let handle = scheduler.start().expect("scheduler should start");

    wait_for_samples(&stats, 3);
    let report = handle.shutdown();

    let profiler = &report.profilers[0];
    assert!(profiler.sampling_failures >= 3);
    assert_eq!(profiler.sampling_failures, profiler.samples);
    assert!(profiler.error.is_none());
}

#[test]
fn dropping_the_handle_flushes() {
    let strategy = MockProfiler::new().with_period(1, PeriodUnit::Milliseconds);
    let events = Arc::clone(&strategy.events);

    let mut scheduler = Scheduler::new();
    let stats = scheduler.register(mock_profiler(strategy));
    let handle = scheduler.start().expect("scheduler should start");
    wait_for_samples(&stats, 1);
    drop(handle);

    let events = events.lock().expect("mock events lock poisoned").clone();
    assert_eq!(events.last().map(String::as_str), Some("flush"));
}

#[test]
fn drives_several_profilers_sharing_one_sink() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(InMemorySink::new());
    let mut scheduler = Scheduler::new();
    let mut handles = Vec::new();
    for _ in 0..3 {
        let profiler = Profiler::with_identity_source(
            sink.clone(),
            &Configuration::default(),
            MockProfiler::new().with_period(2, PeriodUnit::Milliseconds),
            &no_identity,
        )?;
        handles.push(scheduler.register(profiler));
    }
    assert_eq!(scheduler.len(), 3);

    let handle = scheduler.start()?;
    for stats in &handles {
        wait_for_samples(stats, 2);
    }
    let report = handle.shutdown();

    let total: u64 = report.profilers.iter().map(|p| p.recorded_stats).sum();
    assert_eq!(sink.snapshot().scalars.len() as u64, total);
    Ok(())
}

#[test]
fn memory_profiler_reports_tagged_batches_and_bounds() -> Result<(), Box<dyn std::error::Error>> {
    let mut status = NamedTempFile::new()?;
    writeln!(status, "Name:\tprocprof")?;
    writeln!(status, "VmSize:\t   4096 kB")?;
    writeln!(status, "VmRSS:\t   1024 kB")?;
    status.flush()?;

    let config: Configuration = [
        (CONFIG_STATUS_PATH, status.path().to_string_lossy().into_owned()),
        (CONFIG_PERIOD_MS, "1".to_owned()),
        ("task_family", "daily_etl".to_owned()),
    ]
    .into_iter()
    .collect();

    let sink = Arc::new(InMemorySink::new());
    let profiler = Profiler::with_identity_source(
        sink.clone(),
        &config,
        MemoryProfiler::new(),
        &fixed_identity("container_e1_42_7_01_000001"),
    )?;
    assert_eq!(profiler.interval(), Duration::from_millis(1));

    let mut scheduler = Scheduler::new();
    let stats = scheduler.register(profiler);
    let handle = scheduler.start()?;
    wait_for_samples(&stats, 2);
    let report = handle.shutdown();
    assert!(report.is_clean());

    let snapshot = sink.snapshot();
    assert!(snapshot.scalars.is_empty());
    assert_eq!(
        snapshot.gauge(tags::METRIC_MEMORY_RSS_BYTES),
        Some(GaugeValue::Int(1024 * 1024))
    );
    assert_eq!(
        snapshot.gauge(tags::METRIC_MEMORY_VIRTUAL_BYTES),
        Some(GaugeValue::Int(4096 * 1024))
    );
    assert_eq!(
        snapshot.gauge(tags::METRIC_MEMORY_RSS_MAX_BYTES),
        Some(GaugeValue::Int(1024 * 1024))
    );
    for record in &snapshot.batches {
        assert_eq!(
            record.tags,
            vec![
                "container_id:container_e1_42_7_01_000001".to_owned(),
                "application_id:application_42_7".to_owned(),
                "task_family:daily_etl".to_owned(),
            ]
        );
    }
    Ok(())
}

#[test]
fn memory_profiler_skips_bounds_when_sink_declines() -> Result<(), Box<dyn std::error::Error>> {
    let mut status = NamedTempFile::new()?;
    writeln!(status, "VmRSS:\t   8 kB")?;
    status.flush()?;

    let config: Configuration = [(CONFIG_STATUS_PATH, status.path().to_string_lossy().into_owned())]
        .into_iter()
        .collect();
    let sink = Arc::new(InMemorySink::with_emit_bounds(false));
    let mut profiler = Profiler::with_identity_source(
        sink.clone(),
        &config,
        MemoryProfiler::new(),
        &no_identity,
    )?;

    profiler.sample();
    profiler.flush()?;

    let snapshot = sink.snapshot();
    assert_eq!(snapshot.batches.len(), 1);
    assert_eq!(snapshot.gauge(tags::METRIC_MEMORY_RSS_MAX_BYTES), None);
    Ok(())
}

#[test]
fn memory_profiler_contains_missing_status_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config: Configuration = [(
        CONFIG_STATUS_PATH,
        dir.path().join("missing").to_string_lossy().into_owned(),
    )]
    .into_iter()
    .collect();
    let mut profiler = Profiler::with_identity_source(
        Arc::new(InMemorySink::new()),
        &config,
        MemoryProfiler::new(),
        &no_identity,
    )?;

    profiler.sample();
    assert_eq!(profiler.sampling_failures(), 1);
    profiler.flush()?;
    Ok(())
}
