//! Fire-and-forget (§4.9): enqueues without blocking the caller.
//! Enqueue failure is logged, never returned — the caller has already
//! moved on. Bounded by an internal timeout so a stuck queue does not
//! leak unbounded background tasks.

use std::time::Duration;

use crate::worker::client::WorkerClient;
use crate::worker::job::{JobOptions, Queue};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns the enqueue as a background task and returns immediately.
/// Defaults to the `low` queue; pass `queue` to override.
pub fn fire_and_forget(client: WorkerClient, task_type: impl Into<String> + Send + 'static, payload: Vec<u8>, queue: Option<Queue>) {
    let task_type = task_type.into();
    let queue = queue.unwrap_or(Queue::Low);
    tokio::spawn(async move {
        let result = tokio::time::timeout(DEFAULT_TIMEOUT, client.enqueue(task_type.clone(), payload, queue, JobOptions::default())).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(task_type = %task_type, error = %err, "fire-and-forget enqueue failed"),
            Err(_) => tracing::warn!(task_type = %task_type, "fire-and-forget enqueue timed out"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::queue::WeightedQueue;

    #[tokio::test]
    async fn fire_and_forget_enqueues_on_the_low_queue_by_default() {
        let (sender, mut queue) = WeightedQueue::bounded(16);
        let client = WorkerClient::new(sender);
        fire_and_forget(client, "email:send", vec![1, 2, 3], None);

        let job = tokio::time::timeout(Duration::from_secs(1), queue.recv()).await.unwrap().unwrap();
        assert!(matches!(job.queue, Queue::Low));
        assert_eq!(job.task_type, "email:send");
    }
}
