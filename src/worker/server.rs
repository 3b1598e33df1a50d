//! The worker server (C8): pulls jobs off the weighted queue and runs
//! them through a middleware chain mirroring the HTTP one — Recovery,
//! Tracing, Metrics, Logging, in that fixed order (§4.8: "Recovery MUST
//! be outermost").

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;

use crate::observability::Metrics;
use crate::worker::dead_letter::DeadLetterStore;
use crate::worker::error::WorkerError;
use crate::worker::job::Job;
use crate::worker::queue::WeightedQueue;

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Processes one job. An `Err(WorkerError::SkipRetry(..))` sends the
    /// job straight to dead-letter; any other error is retried up to
    /// `job.options.max_retry`.
    async fn handle(&self, job: &Job) -> Result<(), WorkerError>;
}

pub struct WorkerServer {
    handler: Arc<dyn JobHandler>,
    metrics: Metrics,
    dead_letters: Arc<dyn DeadLetterStore>,
}

impl WorkerServer {
    pub fn new(handler: Arc<dyn JobHandler>, metrics: Metrics, dead_letters: Arc<dyn DeadLetterStore>) -> Self {
        Self { handler, metrics, dead_letters }
    }

    /// Drains `queue` until it is closed (all senders dropped) or
    /// `shutdown` resolves, processing jobs one at a time per task — the
    /// caller spawns `concurrency` of these to get `concurrency` parallel
    /// workers (§5: parallel multi-threaded scheduling model).
    pub async fn run(&self, mut queue: WeightedQueue, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                job = queue.recv() => {
                    match job {
                        Some(job) => self.process(job).await,
                        None => break,
                    }
                }
                _ = &mut shutdown => break,
            }
        }
    }

    async fn process(&self, mut job: Job) {
        let attempts = job.options.max_retry.max(1);
        let start = Instant::now();
        let mut last_error: Option<WorkerError> = None;

        for attempt in 1..=attempts {
            let span = tracing::info_span!(
                "job",
                task_type = %job.task_type,
                queue = job.queue.as_str(),
                attempt,
                trace_id = job.trace_id().unwrap_or("unknown"),
            );
            let _entered = span.enter();

            let outcome = AssertUnwindSafe(self.handler.handle(&job)).catch_unwind().await;

            match outcome {
                Ok(Ok(())) => {
                    self.metrics.record_job_processed(&job.task_type, job.queue.as_str(), true, start.elapsed().as_secs_f64() * 1000.0);
                    tracing::info!(task_type = %job.task_type, attempt, "job completed");
                    return;
                }
                Ok(Err(err)) if err.is_skip_retry() => {
                    tracing::warn!(task_type = %job.task_type, error = %err, "job signalled skip retry, dead-lettering");
                    self.dead_letter(&mut job, &err.to_string(), attempt);
                    return;
                }
                Ok(Err(err)) => {
                    tracing::warn!(task_type = %job.task_type, attempt, error = %err, "job attempt failed");
                    last_error = Some(err);
                }
                Err(panic) => {
                    let message = panic_message(&panic);
                    tracing::error!(task_type = %job.task_type, attempt, panic = %message, "job handler panicked");
                    last_error = Some(WorkerError::retryable(message));
                }
            }
        }

        self.metrics.record_job_processed(&job.task_type, job.queue.as_str(), false, start.elapsed().as_secs_f64() * 1000.0);
        let reason = last_error.map(|e| e.to_string()).unwrap_or_else(|| "retries exhausted".to_string());
        self.dead_letter(&mut job, &reason, attempts);
    }

    fn dead_letter(&self, job: &mut Job, reason: &str, attempts: u32) {
        self.dead_letters.record(job, reason, attempts);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
