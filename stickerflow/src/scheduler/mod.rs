//! Bounded-concurrency batch scheduler with fixed-interval admission.
//!
//! [`RateLimitedScheduler`] runs a list of independent tasks with at most
//! `max_concurrent` in flight. Free slots are refilled only on admission ticks
//! spaced `interval` apart, so a slot freed between ticks stays idle until the
//! next one. The first tick fires one interval after the batch starts.
//!
//! # Failure and cancellation
//!
//! The batch fails on the first task error (in completion order) or when the
//! deadline elapses, whichever comes first. Failing stops admission only:
//! tasks already dispatched are detached and keep running, so their side
//! effects may still land after the batch has reported failure.

mod policy;

pub use policy::BatchPolicy;

use crate::errors::{BatchError, TimeoutError};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt::Display;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// An opaque, zero-argument unit of deferred work.
pub type Task<T, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send>;

/// Boxes a closure into a [`Task`].
pub fn task<T, E, F, Fut>(f: F) -> Task<T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Runs batches of tasks under one [`BatchPolicy`].
#[derive(Debug, Clone)]
pub struct RateLimitedScheduler {
    label: String,
    policy: BatchPolicy,
}

impl RateLimitedScheduler {
    /// Creates a scheduler; `label` names the batch in logs and timeout errors.
    #[must_use]
    pub fn new(label: impl Into<String>, policy: BatchPolicy) -> Self {
        Self {
            label: label.into(),
            policy,
        }
    }

    /// Returns the batch label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    /// Runs every task to completion.
    ///
    /// Returns task outputs in completion order. An empty batch succeeds
    /// immediately without starting any timer.
    pub async fn run<T, E>(&self, tasks: Vec<Task<T, E>>) -> Result<Vec<T>, BatchError<E>>
    where
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let total = tasks.len();
        let start = Instant::now();
        debug!(
            batch = %self.label,
            total,
            max_concurrent = self.policy.limit(),
            interval_ms = self.policy.interval_ms,
            "Starting batch"
        );

        let result = match self.policy.timeout() {
            Some(limit) => match time::timeout(limit, self.drive(tasks)).await {
                Ok(result) => result,
                Err(_) => Err(BatchError::Timeout(TimeoutError::new(&self.label, limit))),
            },
            None => self.drive(tasks).await,
        };

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(_) => debug!(batch = %self.label, total, elapsed_ms, "Batch completed"),
            Err(e) => warn!(batch = %self.label, total, elapsed_ms, error = %e, "Batch failed"),
        }
        result
    }

    async fn drive<T, E>(&self, tasks: Vec<Task<T, E>>) -> Result<Vec<T>, BatchError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let total = tasks.len();
        let limit = self.policy.limit();
        let interval = self.policy.interval();

        let mut pending = tasks.into_iter().peekable();
        let mut in_flight: FuturesUnordered<JoinHandle<Result<T, E>>> = FuturesUnordered::new();
        let mut results = Vec::with_capacity(total);
        let mut peak_in_flight = 0;

        // A zero interval admits as soon as a slot frees.
        let mut ticker = if interval.is_zero() {
            None
        } else {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(ticker)
        };

        while results.len() < total {
            let admission_open =
                pending.peek().is_some() && (ticker.is_some() || in_flight.len() < limit);

            tokio::select! {
                biased;

                Some(joined) = in_flight.next(), if !in_flight.is_empty() => {
                    match joined {
                        Ok(Ok(value)) => results.push(value),
                        Ok(Err(e)) => return Err(BatchError::Task(e)),
                        Err(join_error) => return Err(BatchError::Panicked(join_error.to_string())),
                    }
                }
                () = next_tick(ticker.as_mut()), if admission_open => {
                    while in_flight.len() < limit {
                        let Some(task) = pending.next() else { break };
                        in_flight.push(tokio::spawn(task()));
                    }
                    peak_in_flight = peak_in_flight.max(in_flight.len());
                    debug!(
                        batch = %self.label,
                        in_flight = in_flight.len(),
                        remaining = pending.len(),
                        "Admission tick"
                    );
                }
                else => break,
            }
        }

        debug!(batch = %self.label, peak_in_flight, "Batch drained");
        Ok(results)
    }
}

async fn next_tick(ticker: Option<&mut Interval>) {
    if let Some(ticker) = ticker {
        ticker.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Probe {
        started: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        start_times: Mutex<Vec<Duration>>,
    }

    impl Probe {
        fn enter(&self, origin: Instant) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.start_times.lock().push(origin.elapsed());
        }

        fn exit(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn sleeping_tasks(
        probe: &Arc<Probe>,
        origin: Instant,
        count: usize,
        work: Duration,
    ) -> Vec<Task<usize, String>> {
        (0..count)
            .map(|i| {
                let probe = probe.clone();
                task(move || async move {
                    probe.enter(origin);
                    tokio::time::sleep(work).await;
                    probe.exit();
                    Ok(i)
                })
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_succeeds_immediately() {
        let scheduler = RateLimitedScheduler::new(
            "empty",
            BatchPolicy::new(3, Duration::from_secs(5)).with_timeout(Duration::from_secs(1)),
        );
        let start = Instant::now();

        let result = scheduler.run::<(), String>(Vec::new()).await;

        assert_eq!(result.unwrap(), Vec::<()>::new());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_tasks_run_once_under_cap() {
        let probe = Arc::new(Probe::default());
        let origin = Instant::now();
        let scheduler = RateLimitedScheduler::new(
            "capped",
            BatchPolicy::new(3, Duration::from_millis(10)).with_timeout(Duration::from_secs(60)),
        );

        let tasks = sleeping_tasks(&probe, origin, 12, Duration::from_millis(25));
        let mut results = scheduler.run(tasks).await.unwrap();

        results.sort_unstable();
        assert_eq!(results, (0..12).collect::<Vec<_>>());
        assert_eq!(probe.started.load(Ordering::SeqCst), 12);
        assert!(probe.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_above_count_starts_all_on_first_tick() {
        let probe = Arc::new(Probe::default());
        let origin = Instant::now();
        let scheduler = RateLimitedScheduler::new("wide", BatchPolicy::new(5, Duration::from_millis(300)));

        let tasks = sleeping_tasks(&probe, origin, 3, Duration::from_millis(50));
        scheduler.run(tasks).await.unwrap();

        let starts = probe.start_times.lock().clone();
        assert_eq!(starts.len(), 3);
        assert!(starts.iter().all(|t| *t == Duration::from_millis(300)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admissions_spaced_by_interval() {
        let probe = Arc::new(Probe::default());
        let origin = Instant::now();
        let scheduler = RateLimitedScheduler::new("paced", BatchPolicy::new(1, Duration::from_millis(100)));

        let tasks = sleeping_tasks(&probe, origin, 4, Duration::ZERO);
        scheduler.run(tasks).await.unwrap();

        let starts = probe.start_times.lock().clone();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_freed_slot_waits_for_next_tick() {
        let probe = Arc::new(Probe::default());
        let origin = Instant::now();
        let scheduler = RateLimitedScheduler::new("idle-slot", BatchPolicy::new(1, Duration::from_millis(100)));

        // first task frees its slot at 130ms; the next admission is the 200ms tick
        let tasks = sleeping_tasks(&probe, origin, 2, Duration::from_millis(30));
        scheduler.run(tasks).await.unwrap();

        let starts = probe.start_times.lock().clone();
        assert_eq!(starts, vec![Duration::from_millis(100), Duration::from_millis(200)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_admits_without_ticking() {
        let probe = Arc::new(Probe::default());
        let origin = Instant::now();
        let scheduler = RateLimitedScheduler::new("eager", BatchPolicy::new(2, Duration::ZERO));

        let tasks = sleeping_tasks(&probe, origin, 4, Duration::from_millis(10));
        scheduler.run(tasks).await.unwrap();

        assert_eq!(probe.started.load(Ordering::SeqCst), 4);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(probe.start_times.lock()[0], Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_error_fails_batch_and_stops_admission() {
        let started = Arc::new(AtomicUsize::new(0));
        let scheduler = RateLimitedScheduler::new("failing", BatchPolicy::new(1, Duration::from_millis(10)));

        let tasks: Vec<Task<usize, String>> = (0..5)
            .map(|i| {
                let started = started.clone();
                task(move || async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if i == 1 {
                        Err(format!("task {i} exploded"))
                    } else {
                        Ok(i)
                    }
                })
            })
            .collect();

        let result = scheduler.run(tasks).await;

        match result {
            Err(BatchError::Task(message)) => assert_eq!(message, "task 1 exploded"),
            other => panic!("expected task error, got {other:?}"),
        }
        // give detached work a chance to run; nothing new may have been admitted
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_batch_even_if_tasks_succeed() {
        let probe = Arc::new(Probe::default());
        let origin = Instant::now();
        let scheduler = RateLimitedScheduler::new(
            "slow",
            BatchPolicy::new(2, Duration::ZERO).with_timeout(Duration::from_secs(1)),
        );

        let tasks = sleeping_tasks(&probe, origin, 4, Duration::from_millis(700));
        let result = scheduler.run(tasks).await;

        match result {
            Err(BatchError::Timeout(err)) => {
                assert_eq!(err.batch, "slow");
                assert_eq!(err.timeout, Duration::from_secs(1));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(origin.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_fails_batch() {
        let scheduler = RateLimitedScheduler::new("panicky", BatchPolicy::new(2, Duration::ZERO));
        let tasks: Vec<Task<(), String>> = vec![
            task(|| async { Ok(()) }),
            task(|| async {
                let explode = true;
                if explode {
                    panic!("boom");
                }
                Ok(())
            }),
        ];

        let result = scheduler.run(tasks).await;

        assert!(matches!(result, Err(BatchError::Panicked(_))));
    }
}
