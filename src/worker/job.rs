//! Job/Task data model (§3).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The three priority queues, with their fixed dispatch weights (§4.8).
/// The weights are a stable contract: dashboards and SLOs depend on them,
/// so they are not configurable per queue name, only the overall
/// concurrency is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Queue {
    Critical,
    Default,
    Low,
}

impl Queue {
    pub fn as_str(self) -> &'static str {
        match self {
            Queue::Critical => "critical",
            Queue::Default => "default",
            Queue::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default)]
    pub max_retry: u32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub deadline_unix: Option<i64>,
    #[serde(default)]
    pub unique_ttl_secs: Option<u64>,
}

impl JobOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// `{Type, Payload, Options}` — the unit of work the worker server
/// dispatches (§3). `task_type` is the routing key, always
/// `<domain>:<action>` (e.g. `order:ship`, `fanout:user:created:hA`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub task_type: String,
    pub payload: Vec<u8>,
    pub queue: Queue,
    #[serde(default)]
    pub options: JobOptions,
    /// Carries the originating request's trace id into the worker, so a
    /// job enqueued from an HTTP handler shows up correlated in logs and
    /// spans on the worker side too (§3: "RequestID ... lives through
    /// entire request and into any spawned worker tasks via payload
    /// metadata").
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Job {
    pub fn new(task_type: impl Into<String>, payload: Vec<u8>, queue: Queue) -> Self {
        Self { task_type: task_type.into(), payload, queue, options: JobOptions::default(), metadata: HashMap::new() }
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.metadata.get("trace_id").map(String::as_str)
    }
}
