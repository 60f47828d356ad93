use std::iter;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendError, Sender, bounded};
use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, Result};
use crate::profiler::{Profiler, ProfilerStrategy, StatsHandle, panic_message};
use crate::telemetry::tags;

/// Periodic driver for a set of profilers.
///
/// Each profiler gets its own timer thread, so a slow profiler never delays
/// another. Sampling starts immediately and repeats at a fixed rate of
/// [`Profiler::interval`].
#[derive(Default)]
pub struct Scheduler {
    profilers: Vec<Profiler>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a profiler and returns a handle for observing its counters.
    pub fn register<S: ProfilerStrategy + 'static>(&mut self, profiler: Profiler<S>) -> StatsHandle {
        let stats = profiler.stats_handle();
        self.profilers.push(profiler.into_dyn());
        stats
    }

    pub fn len(&self) -> usize {
        self.profilers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profilers.is_empty()
    }

    /// Spawns one timer thread per registered profiler.
    ///
    /// If a thread cannot be spawned, profilers that never started are flushed,
    /// already running ones are stopped and flushed, and the error is returned.
    pub fn start(self) -> Result<SchedulerHandle> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let mut handle = SchedulerHandle {
            shutdown_tx: Some(shutdown_tx),
            workers: Vec::with_capacity(self.profilers.len()),
            started_at: Instant::now(),
        };

        let mut pending = self.profilers.into_iter();
        while let Some(profiler) = pending.next() {
            let name = profiler.name().to_owned();
            let stats = profiler.stats_handle();
            let interval = profiler.interval();
            let worker_rx = shutdown_rx.clone();

            tracing::info!(
                target: tags::TARGET_SCHEDULER,
                op = "start",
                profiler = name.as_str(),
                period = profiler.period().get(),
                unit = %profiler.period_unit(),
                "scheduling profiler"
            );

            // The profiler is handed over only once the thread exists, so a
            // failed spawn leaves it with us.
            let (handoff_tx, handoff_rx) = bounded::<Profiler>(1);
            let spawned = thread::Builder::new()
                .name(format!("procprof-{name}"))
                .spawn(move || {
                    handoff_rx
                        .recv()
                        .ok()
                        .map(|profiler| run_profiler_loop(profiler, interval, worker_rx))
                });

            let join = match spawned {
                Ok(join) => join,
                Err(err) => {
                    flush_unstarted(iter::once(profiler).chain(pending));
                    return Err(ProfilerError::Scheduler(format!(
                        "failed to spawn thread for `{name}`: {err}"
                    )));
                }
            };
            if let Err(SendError(profiler)) = handoff_tx.send(profiler) {
                flush_unstarted(iter::once(profiler));
            }

            handle.workers.push(ScheduledWorker { name, stats, join });
        }

        Ok(handle)
    }
}

/// Flushes profilers whose timer thread never ran.
fn flush_unstarted(profilers: impl IntoIterator<Item = Profiler>) {
    for mut profiler in profilers {
        match profiler.flush() {
            Ok(()) => tracing::warn!(
                target: tags::TARGET_SCHEDULER,
                op = "start",
                result = "aborted",
                profiler = profiler.name(),
                "profiler flushed without being scheduled"
            ),
            Err(error) => tracing::warn!(
                target: tags::TARGET_SCHEDULER,
                op = "start",
                result = "error",
                profiler = profiler.name(),
                %error,
                "profiler flush failed after aborted start"
            ),
        }
    }
}

/// Per-profiler outcome collected at shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilerReport {
    pub name: String,
    pub samples: u64,
    pub recorded_stats: u64,
    pub sampling_failures: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub elapsed: Duration,
    pub profilers: Vec<ProfilerReport>,
}

impl ShutdownReport {
    /// True when every profiler stopped and flushed without error.
    pub fn is_clean(&self) -> bool {
        self.profilers.iter().all(|report| report.error.is_none())
    }

    pub fn profiler(&self, name: &str) -> Option<&ProfilerReport> {
        self.profilers.iter().find(|report| report.name == name)
    }
}

struct ScheduledWorker {
    name: String,
    stats: StatsHandle,
    join: JoinHandle<Option<Profiler>>,
}

/// Running scheduler. Dropping it performs the same shutdown as [`Self::shutdown`].
pub struct SchedulerHandle {
    shutdown_tx: Option<Sender<()>>,
    workers: Vec<ScheduledWorker>,
    started_at: Instant,
}

impl SchedulerHandle {
    /// Counters of every running profiler, by name.
    pub fn stats(&self) -> Vec<(&str, StatsHandle)> {
        self.workers
            .iter()
            .map(|worker| (worker.name.as_str(), worker.stats.clone()))
            .collect()
    }

    /// Stops ticking, waits for in-flight samples and flushes each profiler once.
    pub fn shutdown(mut self) -> ShutdownReport {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> ShutdownReport {
        // Closing the channel wakes every timer thread.
        drop(self.shutdown_tx.take());

        let mut profilers = Vec::with_capacity(self.workers.len());
        for worker in self.workers.drain(..) {
            let report = match worker.join.join() {
                Ok(Some(mut profiler)) => {
                    let error = profiler.flush().err().map(|err| err.to_string());
                    ProfilerReport {
                        name: worker.name,
                        samples: worker.stats.samples(),
                        recorded_stats: profiler.recorded_stats(),
                        sampling_failures: profiler.sampling_failures(),
                        error,
                    }
                }
                Ok(None) => ProfilerReport {
                    name: worker.name,
                    samples: worker.stats.samples(),
                    recorded_stats: worker.stats.recorded_stats(),
                    sampling_failures: worker.stats.sampling_failures(),
                    error: Some("profiler thread exited before receiving its profiler".to_owned()),
                },
                Err(payload) => ProfilerReport {
                    name: worker.name,
                    samples: worker.stats.samples(),
                    recorded_stats: worker.stats.recorded_stats(),
                    sampling_failures: worker.stats.sampling_failures(),
                    error: Some(format!(
                        "profiler thread panicked: {}",
                        panic_message(payload.as_ref())
                    )),
                },
            };

            match &report.error {
                None => tracing::info!(
                    target: tags::TARGET_SCHEDULER,
                    op = "shutdown",
                    result = "ok",
                    profiler = report.name.as_str(),
                    samples = report.samples,
                    recorded_stats = report.recorded_stats,
                    "profiler stopped"
                ),
                Some(error) => tracing::warn!(
                    target: tags::TARGET_SCHEDULER,
                    op = "shutdown",
                    result = "error",
                    profiler = report.name.as_str(),
                    error = error.as_str(),
                    "profiler stopped with error"
                ),
            }
            profilers.push(report);
        }

        ShutdownReport {
            elapsed: self.started_at.elapsed(),
            profilers,
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            let _ = self.shutdown_inner();
        }
    }
}

fn run_profiler_loop(mut profiler: Profiler, interval: Duration, shutdown_rx: Receiver<()>) -> Profiler {
    let mut next_tick = Instant::now();
    loop {
        profiler.sample();

        let now = Instant::now();
        let signal = match next_tick.checked_add(interval) {
            Some(tick) => {
                // Skip missed ticks instead of bursting to catch up.
                next_tick = tick.max(now);
                shutdown_rx.recv_timeout(next_tick - now)
            }
            None => shutdown_rx
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        match signal {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    profiler
}
