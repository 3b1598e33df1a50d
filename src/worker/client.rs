//! Enqueue client (§4.8): the producer side of the job runtime. Shares
//! the [`Job`] type with the worker server — the task-type string is the
//! only contract between them.

use crate::context;
use crate::error::Result;
use crate::worker::job::{Job, JobOptions, Queue};
use crate::worker::queue::QueueSender;

#[derive(Clone)]
pub struct WorkerClient {
    sender: QueueSender,
}

impl WorkerClient {
    pub fn new(sender: QueueSender) -> Self {
        Self { sender }
    }

    pub async fn enqueue(&self, task_type: impl Into<String>, payload: Vec<u8>, queue: Queue, options: JobOptions) -> Result<()> {
        let mut job = Job::new(task_type, payload, queue).with_options(options);
        if let Some(request_id) = context::current_request_id() {
            job = job.with_metadata("trace_id", request_id.to_string());
        }
        self.sender.send(job).await.map_err(|e| crate::error::Error::Internal(format!("failed to enqueue job: {e}")))
    }

    pub async fn enqueue_critical(&self, task_type: impl Into<String>, payload: Vec<u8>) -> Result<()> {
        self.enqueue(task_type, payload, Queue::Critical, JobOptions::default()).await
    }

    pub async fn enqueue_default(&self, task_type: impl Into<String>, payload: Vec<u8>) -> Result<()> {
        self.enqueue(task_type, payload, Queue::Default, JobOptions::default()).await
    }

    pub async fn enqueue_low(&self, task_type: impl Into<String>, payload: Vec<u8>) -> Result<()> {
        self.enqueue(task_type, payload, Queue::Low, JobOptions::default()).await
    }
}
