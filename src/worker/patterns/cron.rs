//! Scheduled/cron jobs (§4.9): parses a standard 5-field cron expression
//! (optional leading seconds field, Quartz-style) and enqueues the
//! associated task on each fire. Missed fires during an outage are not
//! backfilled — the scheduler only ever looks at "what's the next fire
//! from now", never at history.

use std::str::FromStr;
use std::time::Duration;

use ::cron::Schedule;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::worker::client::WorkerClient;
use crate::worker::job::{JobOptions, Queue};

pub struct CronJob {
    pub task_type: String,
    pub payload: Vec<u8>,
    pub queue: Queue,
    schedule: Schedule,
}

impl CronJob {
    pub fn new(expression: &str, task_type: impl Into<String>, payload: Vec<u8>, queue: Queue) -> Result<Self> {
        let schedule = Schedule::from_str(expression).map_err(|e| Error::Internal(format!("invalid cron expression '{expression}': {e}")))?;
        Ok(Self { task_type: task_type.into(), payload, queue, schedule })
    }

    fn next_delay(&self) -> Option<Duration> {
        let now = Utc::now();
        self.schedule.after(&now).next().map(|fire_at| (fire_at - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Runs `job` forever, enqueuing on every scheduled fire, until `shutdown`
/// resolves.
pub async fn run_cron(client: WorkerClient, job: CronJob, shutdown: impl std::future::Future<Output = ()>) {
    tokio::pin!(shutdown);
    loop {
        let Some(delay) = job.next_delay() else {
            tracing::warn!(task_type = %job.task_type, "cron schedule has no future fire, stopping");
            return;
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                if let Err(err) = client.enqueue(job.task_type.clone(), job.payload.clone(), job.queue, JobOptions::default()).await {
                    tracing::error!(task_type = %job.task_type, error = %err, "cron enqueue failed");
                }
            }
            _ = &mut shutdown => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_expressions() {
        assert!(CronJob::new("not a cron expression", "report:daily", vec![], Queue::Low).is_err());
    }

    #[test]
    fn valid_expression_has_a_next_fire() {
        let job = CronJob::new("0 * * * * *", "report:hourly", vec![], Queue::Low).unwrap();
        assert!(job.next_delay().is_some());
    }
}
