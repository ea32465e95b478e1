//! Batched, throttled execution of asset producers.
//!
//! Work items are split into consecutive batches of `batch_size`. Every
//! producer in a batch runs concurrently and the batch settles completely
//! before the runner sleeps `delay` and moves on; batch N+1 never overlaps
//! batch N. Items whose artifact already exists are counted as skipped
//! without calling the producer. A failing producer is logged and counted;
//! it is never retried and never stops the run.
//!
//! With a token-bucket quota configured, each producer call additionally
//! waits for a token, which spreads calls inside a batch.

use futures::future::join_all;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use kinder_config::ThrottleConfig;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Something a producer turns into a stored artifact.
pub trait WorkItem: Clone + Send + Sync {
    /// Short name used in logs and the failure list.
    fn label(&self) -> String;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    pub batches: usize,
    /// `(label, error)` for every failed item, in input order.
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.success + self.skipped + self.failed
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "✅ {} generated, ⏭️  {} skipped, ❌ {} failed ({} batches)",
            self.success, self.skipped, self.failed, self.batches
        )?;
        for (label, error) in &self.failures {
            write!(f, "\n   - {}: {}", label, error)?;
        }
        Ok(())
    }
}

enum Outcome {
    Produced,
    Skipped,
    Failed(String, String),
}

pub struct BatchThrottle {
    batch_size: usize,
    delay: Duration,
    pacing: Option<DefaultDirectRateLimiter>,
}

impl fmt::Debug for BatchThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchThrottle")
            .field("batch_size", &self.batch_size)
            .field("delay", &self.delay)
            .field("paced", &self.pacing.is_some())
            .finish()
    }
}

impl BatchThrottle {
    /// A zero `batch_size` is treated as one.
    pub fn new(batch_size: usize, delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delay,
            pacing: None,
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        let throttle = Self::new(config.batch_size, config.delay());
        match config.quota() {
            Some(quota) => throttle.with_pacing(quota),
            None => throttle,
        }
    }

    pub fn with_pacing(mut self, quota: Quota) -> Self {
        self.pacing = Some(RateLimiter::direct(quota));
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `produce` for every item `is_done` reports as missing.
    pub async fn run<T, D, DFut, P, PFut, E>(&self, items: Vec<T>, is_done: D, produce: P) -> RunSummary
    where
        T: WorkItem,
        D: Fn(T) -> DFut,
        DFut: Future<Output = bool>,
        P: Fn(T) -> PFut,
        PFut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let mut summary = RunSummary::default();
        let total_batches = items.len().div_ceil(self.batch_size);
        let start_time = Instant::now();

        info!(
            items = items.len(),
            batch_size = self.batch_size,
            delay_ms = self.delay.as_millis() as u64,
            paced = self.pacing.is_some(),
            "Starting batched run"
        );

        let is_done = &is_done;
        let produce = &produce;

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.delay.is_zero() {
                debug!(delay_ms = self.delay.as_millis() as u64, "Waiting before next batch");
                tokio::time::sleep(self.delay).await;
            }

            info!(batch = index + 1, of = total_batches, size = batch.len(), "Processing batch");

            let outcomes = join_all(batch.iter().cloned().map(|item| async move {
                let label = item.label();
                if is_done(item.clone()).await {
                    debug!(item = %label, "Already present, skipping");
                    return Outcome::Skipped;
                }
                if let Some(limiter) = &self.pacing {
                    limiter.until_ready().await;
                }
                match produce(item).await {
                    Ok(()) => {
                        debug!(item = %label, "Produced");
                        Outcome::Produced
                    }
                    Err(e) => {
                        warn!(item = %label, error = %e, "Producer failed");
                        Outcome::Failed(label, e.to_string())
                    }
                }
            }))
            .await;

            for outcome in outcomes {
                match outcome {
                    Outcome::Produced => summary.success += 1,
                    Outcome::Skipped => summary.skipped += 1,
                    Outcome::Failed(label, error) => {
                        summary.failed += 1;
                        summary.failures.push((label, error));
                    }
                }
            }
            summary.batches += 1;
        }

        info!(
            success = summary.success,
            skipped = summary.skipped,
            failed = summary.failed,
            batches = summary.batches,
            elapsed = ?start_time.elapsed(),
            "Batched run finished"
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::num::NonZeroU32;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant as TokioInstant;

    #[derive(Clone, Debug)]
    struct Job(usize);

    impl WorkItem for Job {
        fn label(&self) -> String {
            format!("job-{}", self.0)
        }
    }

    fn jobs(n: usize) -> Vec<Job> {
        (0..n).map(Job).collect()
    }

    /// Records when each producer started, keyed by item index.
    #[derive(Clone, Default)]
    struct Recorder {
        starts: Arc<Mutex<Vec<(usize, TokioInstant)>>>,
    }

    impl Recorder {
        fn record(&self, index: usize) {
            self.starts.lock().unwrap().push((index, TokioInstant::now()));
        }

        fn calls(&self) -> usize {
            self.starts.lock().unwrap().len()
        }

        fn start_of(&self, index: usize) -> TokioInstant {
            self.starts
                .lock()
                .unwrap()
                .iter()
                .find(|(i, _)| *i == index)
                .map(|(_, t)| *t)
                .unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_twelve_items_in_three_batches() {
        let throttle = BatchThrottle::new(5, Duration::from_millis(1000));
        let recorder = Recorder::default();

        let summary = throttle
            .run(
                jobs(12),
                |_| async { false },
                |job: Job| {
                    let recorder = recorder.clone();
                    async move {
                        recorder.record(job.0);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<(), String>(())
                    }
                },
            )
            .await;

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.success, 12);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(recorder.calls(), 12);

        // Batch boundaries fall at items 5 and 10.
        let gap1 = recorder.start_of(5) - recorder.start_of(4);
        let gap2 = recorder.start_of(10) - recorder.start_of(9);
        assert!(gap1 >= Duration::from_millis(1000), "gap1 = {:?}", gap1);
        assert!(gap2 >= Duration::from_millis(1000), "gap2 = {:?}", gap2);

        // Within a batch producers start together.
        assert_eq!(recorder.start_of(0), recorder.start_of(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_last_batch() {
        let throttle = BatchThrottle::new(5, Duration::from_secs(10));
        let started = TokioInstant::now();

        throttle
            .run(jobs(5), |_| async { false }, |_| async { Ok::<(), String>(()) })
            .await;

        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_batch_waits_for_slowest_producer() {
        let throttle = BatchThrottle::new(2, Duration::from_millis(100));
        let recorder = Recorder::default();

        throttle
            .run(jobs(3), |_| async { false }, |job: Job| {
                let recorder = recorder.clone();
                async move {
                    recorder.record(job.0);
                    let work = if job.0 == 1 { 5_000 } else { 10 };
                    tokio::time::sleep(Duration::from_millis(work)).await;
                    Ok::<(), String>(())
                }
            })
            .await;

        let gap = recorder.start_of(2) - recorder.start_of(1);
        assert!(gap >= Duration::from_millis(5_100), "gap = {:?}", gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_check_precedes_producer() {
        let throttle = BatchThrottle::new(5, Duration::from_millis(1000));
        let recorder = Recorder::default();
        let present: HashSet<usize> = [1, 3, 7].into_iter().collect();
        let present = &present;

        let summary = throttle
            .run(
                jobs(8),
                |job: Job| async move { present.contains(&job.0) },
                |job: Job| {
                    let recorder = recorder.clone();
                    async move {
                        assert!(!present.contains(&job.0), "producer called for existing item");
                        recorder.record(job.0);
                        Ok::<(), String>(())
                    }
                },
            )
            .await;

        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.success, 5);
        assert_eq!(recorder.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_run() {
        let throttle = BatchThrottle::new(3, Duration::from_millis(500));
        let recorder = Recorder::default();

        let summary = throttle
            .run(jobs(7), |_| async { false }, |job: Job| {
                let recorder = recorder.clone();
                async move {
                    recorder.record(job.0);
                    if job.0 % 3 == 0 {
                        Err(format!("provider rejected {}", job.0))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(recorder.calls(), 7);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.success, 4);
        assert_eq!(summary.batches, 3);
        assert_eq!(
            summary.failures,
            vec![
                ("job-0".to_string(), "provider rejected 0".to_string()),
                ("job-3".to_string(), "provider rejected 3".to_string()),
                ("job-6".to_string(), "provider rejected 6".to_string()),
            ]
        );
        assert!(!summary.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_after_completion_produces_nothing() {
        let throttle = BatchThrottle::new(4, Duration::from_millis(250));
        let stored: Arc<Mutex<HashSet<usize>>> = Arc::default();
        let recorder = Recorder::default();

        let is_done = |job: Job| {
            let stored = stored.clone();
            async move { stored.lock().unwrap().contains(&job.0) }
        };
        let produce = |job: Job| {
            let stored = stored.clone();
            let recorder = recorder.clone();
            async move {
                recorder.record(job.0);
                stored.lock().unwrap().insert(job.0);
                Ok::<(), String>(())
            }
        };

        let first = throttle.run(jobs(10), is_done, produce).await;
        assert_eq!(first.success, 10);

        let second = throttle.run(jobs(10), is_done, produce).await;
        assert_eq!(second.skipped, 10);
        assert_eq!(second.success, 0);
        assert_eq!(recorder.calls(), 10);
        assert_eq!(second.total(), 10);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let throttle = BatchThrottle::new(5, Duration::from_secs(60));
        let summary = throttle
            .run(Vec::<Job>::new(), |_| async { false }, |_| async { Ok::<(), String>(()) })
            .await;
        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    async fn test_zero_batch_size_means_one() {
        let throttle = BatchThrottle::new(0, Duration::ZERO);
        assert_eq!(throttle.batch_size(), 1);
        let summary = throttle
            .run(jobs(3), |_| async { false }, |_| async { Ok::<(), String>(()) })
            .await;
        assert_eq!(summary.batches, 3);
    }

    #[tokio::test]
    async fn test_generous_pacing_does_not_block() {
        let quota = Quota::per_second(NonZeroU32::new(1000).unwrap())
            .allow_burst(NonZeroU32::new(10).unwrap());
        let throttle = BatchThrottle::new(5, Duration::ZERO).with_pacing(quota);

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            throttle.run(jobs(10), |_| async { false }, |_| async { Ok::<(), String>(()) }),
        )
        .await
        .unwrap();
        assert_eq!(summary.success, 10);
    }

    #[test]
    fn test_from_config_applies_pacing() {
        let config = ThrottleConfig::default()
            .with_batch_size(3)
            .with_delay_ms(20)
            .with_pacing(Some(2), None);
        let throttle = BatchThrottle::from_config(&config);
        assert_eq!(throttle.batch_size(), 3);
        assert_eq!(throttle.delay(), Duration::from_millis(20));
        assert!(throttle.pacing.is_some());
    }

    #[test]
    fn test_summary_display_lists_failures() {
        let summary = RunSummary {
            success: 2,
            skipped: 1,
            failed: 1,
            batches: 1,
            failures: vec![("q-3".into(), "timeout".into())],
        };
        let text = summary.to_string();
        assert!(text.contains("2 generated"));
        assert!(text.contains("q-3: timeout"));
    }
}
