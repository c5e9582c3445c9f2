//! Periodic ingestion trigger.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use geotiles_core::TileStore;
use log::{error, info};
use tokio::time::MissedTickBehavior;

use crate::pipeline::{IngestionPipeline, IngestionReport};
use crate::source::GeometrySource;

/// Shortest interval accepted by [`IngestionSchedule`].
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A unit of ingestion work the schedule can run on the blocking pool.
pub trait IngestionJob: Send + Sync + 'static {
    /// Run once to completion.
    fn run(&self) -> IngestionReport;
}

impl<G, S> IngestionJob for IngestionPipeline<G, S>
where
    G: GeometrySource + 'static,
    S: TileStore + 'static,
{
    fn run(&self) -> IngestionReport {
        IngestionPipeline::run(self)
    }
}

/// Runs an [`IngestionJob`] immediately and then once per interval.
///
/// Runs never overlap: the next tick is only awaited after the previous run
/// has returned, and ticks missed while a run was in progress are delayed
/// rather than replayed in a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionSchedule {
    interval: Duration,
}

impl IngestionSchedule {
    /// Schedule runs `interval` apart. Intervals shorter than one
    /// millisecond are raised to one millisecond.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Time between the starts of consecutive runs.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drive `job` until `shutdown` resolves and return the number of runs
    /// that completed.
    ///
    /// A run already in progress when `shutdown` resolves is awaited before
    /// returning.
    pub async fn run_until<J, F>(&self, job: Arc<J>, shutdown: F) -> usize
    where
        J: IngestionJob,
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        info!("Ingestion scheduled every {:?}", self.interval);

        let mut runs = 0;
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    let job = Arc::clone(&job);
                    match tokio::task::spawn_blocking(move || job.run()).await {
                        Ok(report) => {
                            runs += 1;
                            log_report(runs, &report);
                        }
                        Err(err) => error!("Ingestion task did not complete: {err}"),
                    }
                }
            }
        }

        info!("Ingestion schedule stopped after {runs} runs");
        runs
    }
}

fn log_report(run: usize, report: &IngestionReport) {
    if report.succeeded {
        info!(
            "Ingestion run {run} finished: {} features in {} batches ({:?})",
            report.features_attempted, report.batches_attempted, report.elapsed
        );
    } else {
        error!(
            "Ingestion run {run} failed after {} batches; stored tiles unchanged",
            report.batches_attempted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Counts runs and wakes the test once `target` runs have finished.
    struct CountingJob {
        runs: AtomicUsize,
        running: AtomicBool,
        overlapped: AtomicBool,
        target: usize,
        work: Duration,
        done: Arc<Notify>,
    }

    impl CountingJob {
        fn new(target: usize, work: Duration) -> Self {
            Self {
                runs: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
                target,
                work,
                done: Arc::new(Notify::new()),
            }
        }
    }

    impl IngestionJob for CountingJob {
        fn run(&self) -> IngestionReport {
            if self.running.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(self.work);
            self.running.store(false, Ordering::SeqCst);
            if self.runs.fetch_add(1, Ordering::SeqCst) + 1 == self.target {
                self.done.notify_one();
            }
            IngestionReport {
                succeeded: true,
                features_attempted: 0,
                batches_attempted: 0,
                first_error: None,
                bounds: None,
                elapsed: self.work,
            }
        }
    }

    #[tokio::test]
    async fn first_run_starts_immediately() {
        let job = Arc::new(CountingJob::new(1, Duration::ZERO));
        let done = Arc::clone(&job.done);
        let schedule = IngestionSchedule::new(Duration::from_secs(3600));

        let runs = schedule
            .run_until(Arc::clone(&job), async move { done.notified().await })
            .await;

        assert_eq!(runs, 1);
    }

    #[tokio::test]
    async fn runs_never_overlap() {
        let job = Arc::new(CountingJob::new(3, Duration::from_millis(20)));
        let done = Arc::clone(&job.done);
        let schedule = IngestionSchedule::new(Duration::from_millis(5));

        let runs = schedule
            .run_until(Arc::clone(&job), async move { done.notified().await })
            .await;

        assert_eq!(runs, 3);
        assert!(!job.overlapped.load(Ordering::SeqCst));
    }

    #[rstest]
    fn zero_interval_is_raised_to_minimum() {
        let schedule = IngestionSchedule::new(Duration::ZERO);
        assert_eq!(schedule.interval(), MIN_INTERVAL);
    }
}
