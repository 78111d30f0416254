//! Fan-out/fan-in execution of many analyses under a bounded worker budget.
//!
//! Admission is controlled by a semaphore sized to the concurrency budget;
//! an optional pacing delay enforces minimum spacing between dispatches for
//! providers with strict per-minute quotas. Both constraints apply at the
//! same time. One failed photo never aborts the batch.

use crate::model::{AnalysisRequest, AnalysisResult};
use crate::providers::VisionProvider;
use crate::retry::RetryingClient;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Execution knobs for one batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum simultaneously in-flight analyses (1..N)
    pub concurrency: usize,
    /// Minimum spacing between request dispatches, `None` = unpaced
    pub pacing_delay: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            concurrency: 4,
            pacing_delay: None,
        }
    }
}

/// Live counters for one batch, shared between the scheduler and callers.
///
/// The running count and cumulative timings are the only mutable shared
/// state in the core; tasks update them atomically on completion.
pub struct BatchProgress {
    total: u64,
    completed: AtomicU64,
    running: AtomicUsize,
    consumed_ms: AtomicU64,
    started: Instant,
    cancelled: AtomicBool,
    finished: AtomicBool,
}

impl BatchProgress {
    fn new(total: u64) -> Self {
        BatchProgress {
            total,
            completed: AtomicU64::new(0),
            running: AtomicUsize::new(0),
            consumed_ms: AtomicU64::new(0),
            started: Instant::now(),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// Request cooperative cancellation: no new work is admitted, in-flight
    /// analyses run to completion and their results are still delivered.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once every admitted analysis has completed and the batch drained.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Number of analyses currently in flight.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let completed = self.completed.load(Ordering::SeqCst);
        ProgressSnapshot {
            completed,
            remaining: self.total.saturating_sub(completed),
            running: self.running(),
            elapsed_wall: self.started.elapsed(),
            consumed: Duration::from_millis(self.consumed_ms.load(Ordering::SeqCst)),
        }
    }
}

/// Point-in-time view of a batch's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub remaining: u64,
    pub running: usize,
    /// Wall-clock time since the batch started
    pub elapsed_wall: Duration,
    /// Sum of per-request elapsed durations across completed analyses
    pub consumed: Duration,
}

/// Caller's handle on a running batch: indexed result stream plus counters.
pub struct BatchHandle {
    results: mpsc::UnboundedReceiver<(usize, AnalysisResult)>,
    progress: Arc<BatchProgress>,
}

impl BatchHandle {
    /// Next completed analysis, tagged with its submission index.
    /// Completion order may interleave; the index is the correlation key.
    pub async fn next(&mut self) -> Option<(usize, AnalysisResult)> {
        self.results.recv().await
    }

    pub fn progress(&self) -> Arc<BatchProgress> {
        self.progress.clone()
    }

    pub fn cancel(&self) {
        self.progress.cancel();
    }

    /// Drain the stream to completion.
    pub async fn collect(mut self) -> Vec<(usize, AnalysisResult)> {
        let mut results = Vec::new();
        while let Some(entry) = self.results.recv().await {
            results.push(entry);
        }
        results
    }
}

/// Drives N photos through the bounded worker budget.
pub struct BatchScheduler {
    provider: Arc<dyn VisionProvider>,
    retry: RetryingClient,
    options: BatchOptions,
}

impl BatchScheduler {
    pub fn new(
        provider: Arc<dyn VisionProvider>,
        retry: RetryingClient,
        options: BatchOptions,
    ) -> Self {
        BatchScheduler {
            provider,
            retry,
            options,
        }
    }

    /// Start the batch. Returns immediately; results stream through the
    /// handle as analyses finish.
    pub fn run(&self, requests: Vec<AnalysisRequest>) -> BatchHandle {
        let progress = Arc::new(BatchProgress::new(requests.len() as u64));
        let (tx, rx) = mpsc::unbounded_channel();

        let provider = self.provider.clone();
        let retry = self.retry.clone();
        let options = self.options.clone();
        let driver_progress = progress.clone();

        tokio::spawn(async move {
            drive(provider, retry, options, requests, tx, driver_progress).await;
        });

        BatchHandle {
            results: rx,
            progress,
        }
    }
}

async fn drive(
    provider: Arc<dyn VisionProvider>,
    retry: RetryingClient,
    options: BatchOptions,
    requests: Vec<AnalysisRequest>,
    tx: mpsc::UnboundedSender<(usize, AnalysisResult)>,
    progress: Arc<BatchProgress>,
) {
    let total = requests.len();
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut join_set: JoinSet<()> = JoinSet::new();
    let mut last_dispatch: Option<tokio::time::Instant> = None;
    let mut admitted = 0usize;

    info!(
        "starting batch of {} analyses with {} (concurrency {})",
        total,
        provider.provider_name(),
        options.concurrency.max(1)
    );

    for (index, request) in requests.into_iter().enumerate() {
        if progress.is_cancelled() {
            break;
        }

        if let (Some(delay), Some(last)) = (options.pacing_delay, last_dispatch) {
            tokio::time::sleep_until(last + delay).await;
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        // Cancellation may have been requested during the pacing or
        // admission waits
        if progress.is_cancelled() {
            break;
        }

        progress.running.fetch_add(1, Ordering::SeqCst);
        last_dispatch = Some(tokio::time::Instant::now());
        admitted += 1;

        let provider = provider.clone();
        let retry = retry.clone();
        let tx = tx.clone();
        let progress = progress.clone();

        join_set.spawn(async move {
            let result = retry.analyze(provider.as_ref(), &request).await;

            progress.running.fetch_sub(1, Ordering::SeqCst);
            progress.completed.fetch_add(1, Ordering::SeqCst);
            progress
                .consumed_ms
                .fetch_add(result.elapsed.as_millis() as u64, Ordering::SeqCst);

            if tx.send((index, result)).is_err() {
                debug!("batch receiver dropped before result {} was delivered", index);
            }
            drop(permit);
        });
    }

    // Close our sender so the stream ends once in-flight tasks drain
    drop(tx);
    while join_set.join_next().await.is_some() {}
    progress.finished.store(true, Ordering::SeqCst);

    let snapshot = progress.snapshot();
    info!(
        "batch finished: {}/{} admitted, {} completed in {:?} (model time {:?})",
        admitted, total, snapshot.completed, snapshot.elapsed_wall, snapshot.consumed
    );
}
