//! Dead-letter surface: the terminal state for a job that exhausted
//! retries or signalled skip-retry (§9 glossary). A bounded in-memory
//! list is enough to make dead-lettered jobs inspectable without a
//! persistence dependency; operators needing durable dead-letter storage
//! implement [`DeadLetterStore`] against their own backend.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::worker::job::Job;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task_type: String,
    pub queue: String,
    pub reason: String,
    pub attempts: u32,
}

pub trait DeadLetterStore: Send + Sync {
    fn record(&self, job: &Job, reason: &str, attempts: u32);
    fn recent(&self, limit: usize) -> Vec<DeadLetter>;
}

/// Bounded ring buffer of the most recent dead-lettered jobs.
pub struct InMemoryDeadLetterStore {
    capacity: usize,
    entries: Mutex<VecDeque<DeadLetter>>,
}

impl InMemoryDeadLetterStore {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity)) }
    }
}

impl DeadLetterStore for InMemoryDeadLetterStore {
    fn record(&self, job: &Job, reason: &str, attempts: u32) {
        let mut entries = self.entries.lock().expect("dead letter store mutex poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(DeadLetter {
            task_type: job.task_type.clone(),
            queue: job.queue.as_str().to_string(),
            reason: reason.to_string(),
            attempts,
        });
    }

    fn recent(&self, limit: usize) -> Vec<DeadLetter> {
        let entries = self.entries.lock().expect("dead letter store mutex poisoned");
        entries.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::job::Queue;

    #[test]
    fn records_are_bounded_by_capacity() {
        let store = InMemoryDeadLetterStore::new(2);
        for i in 0..5 {
            store.record(&Job::new(format!("job:{i}"), vec![], Queue::Low), "exhausted retries", 3);
        }
        assert_eq!(store.recent(10).len(), 2);
    }

    #[test]
    fn recent_returns_most_recent_first() {
        let store = InMemoryDeadLetterStore::new(10);
        store.record(&Job::new("job:a", vec![], Queue::Low), "skip retry", 1);
        store.record(&Job::new("job:b", vec![], Queue::Low), "skip retry", 1);
        let recent = store.recent(10);
        assert_eq!(recent[0].task_type, "job:b");
    }
}
