mod support;

use std::sync::Arc;
use std::thread;

use procprof_core::{
    Configuration, GaugeBatch, GaugeValue, InMemorySink, Profiler, Recorder, TagSet,
};
use support::{CONTAINER_ID, MockProfiler, fixed_identity};

fn batch(entries: &[(&str, i64)]) -> GaugeBatch {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_owned(), GaugeValue::from(*value)))
        .collect()
}

#[test]
fn counts_calls_not_entries() {
    let sink = Arc::new(InMemorySink::new());
    let recorder = Recorder::new(sink.clone(), TagSet::default());

    recorder.record_gauge("heap.used", 10);
    recorder.record_gauge("heap.committed", 2.5);
    recorder.record_gauges(&batch(&[("a", 1), ("b", 2), ("c", 3)]));

    assert_eq!(recorder.recorded_stats(), 3);
    let snapshot = sink.snapshot();
    assert_eq!(snapshot.scalars.len(), 2);
    assert_eq!(snapshot.batches.len(), 1);
    assert_eq!(snapshot.batches[0].values.len(), 3);
}

#[test]
fn empty_batch_still_counts_once() {
    let recorder = Recorder::new(Arc::new(InMemorySink::new()), TagSet::default());
    recorder.record_gauges(&GaugeBatch::new());
    assert_eq!(recorder.recorded_stats(), 1);
}

#[test]
fn scalar_path_is_untagged_and_batched_path_is_tagged() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(InMemorySink::new());
    let config: Configuration = [("task_family", "daily_etl")].into_iter().collect();
    let profiler = Profiler::with_identity_source(
        sink.clone(),
        &config,
        MockProfiler::new(),
        &fixed_identity(CONTAINER_ID),
    )?;
    let recorder = profiler.recorder();

    recorder.record_gauge("scalar", 1);
    recorder.record_gauges(&batch(&[("batched", 2)]));

    let snapshot = sink.snapshot();
    assert_eq!(snapshot.scalars[0].key, "scalar");
    assert_eq!(snapshot.scalars[0].value, GaugeValue::Int(1));
    assert_eq!(
        snapshot.batches[0].tags,
        vec![
            format!("container_id:{CONTAINER_ID}"),
            "application_id:application_1510780065801_7737".to_owned(),
            "task_family:daily_etl".to_owned(),
        ]
    );
    Ok(())
}

#[test]
fn batched_path_forwards_identical_tags_every_call() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(InMemorySink::new());
    let profiler = Profiler::with_identity_source(
        sink.clone(),
        &Configuration::default(),
        MockProfiler::new(),
        &fixed_identity(CONTAINER_ID),
    )?;

    for round in 0..5 {
        profiler
            .recorder()
            .record_gauges(&batch(&[("round", round)]));
    }

    let snapshot = sink.snapshot();
    assert_eq!(snapshot.batches.len(), 5);
    for record in &snapshot.batches {
        assert_eq!(record.tags, profiler.tags().to_vec());
    }
    assert_eq!(snapshot.gauge("round"), Some(GaugeValue::Int(4)));
    Ok(())
}

#[test]
fn two_scalars_and_one_batch_record_three_stats() -> Result<(), Box<dyn std::error::Error>> {
    let profiler = Profiler::with_identity_source(
        Arc::new(InMemorySink::new()),
        &Configuration::default(),
        MockProfiler::new(),
        &support::no_identity,
    )?;

    profiler.recorder().record_gauge("one", 1);
    profiler.recorder().record_gauge("two", 2);
    profiler
        .recorder()
        .record_gauges(&batch(&[("x", 1), ("y", 2), ("z", 3)]));

    assert_eq!(profiler.recorded_stats(), 3);
    assert_eq!(profiler.stats_handle().recorded_stats(), 3);
    Ok(())
}

#[test]
fn stats_are_observable_from_another_thread() -> Result<(), Box<dyn std::error::Error>> {
    let mut profiler = Profiler::with_identity_source(
        Arc::new(InMemorySink::new()),
        &Configuration::default(),
        MockProfiler::new(),
        &support::no_identity,
    )?;
    let stats = profiler.stats_handle();

    let monitor = thread::spawn(move || {
        let mut last = 0;
        for _ in 0..1_000 {
            let current = stats.recorded_stats();
            assert!(current >= last, "recorded stats went backwards");
            last = current;
        }
        last
    });

    for _ in 0..100 {
        profiler.sample();
    }
    let observed = monitor.join().expect("monitor thread panicked");

    assert!(observed <= 100);
    assert_eq!(profiler.recorded_stats(), 100);
    Ok(())
}

#[test]
fn gauge_values_convert_from_primitives() {
    assert_eq!(GaugeValue::from(7u32), GaugeValue::Int(7));
    assert_eq!(GaugeValue::from(-3i64), GaugeValue::Int(-3));
    assert_eq!(GaugeValue::from(1.5f64), GaugeValue::Float(1.5));
    assert_eq!(
        GaugeValue::from(u64::MAX),
        GaugeValue::Float(u64::MAX as f64)
    );
}
