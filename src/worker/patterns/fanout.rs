//! Fanout (§4.9, §3): broadcasts one logical event to N independently
//! registered handlers, each dispatched as its own job so a failing
//! handler retries without affecting its siblings (isolation guarantee,
//! P7).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::worker::client::WorkerClient;
use crate::worker::error::WorkerError;
use crate::worker::job::{JobOptions, Queue};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutEvent {
    pub event_type: String,
    pub payload: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl FanoutEvent {
    pub fn new(event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self { event_type: event_type.into(), payload, metadata: HashMap::new(), timestamp: None }
    }

    fn stamped(mut self) -> Self {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FanoutRegisterError {
    #[error("event type must not be empty")]
    EmptyEventType,
    #[error("handler id must not be empty")]
    EmptyHandlerId,
    #[error("handler '{0}' is already registered for event type '{1}'")]
    DuplicateHandler(String, String),
}

#[derive(Clone)]
pub struct FanoutHandlerSpec {
    pub id: String,
    pub queue: Queue,
    pub options: JobOptions,
}

/// Process-wide, concurrently-read mapping of event type → ordered
/// handler specs. Writes are rare (startup registration); reads happen
/// on every fanout emission, so a reader-writer lock fits the access
/// pattern (§5).
#[derive(Default)]
pub struct FanoutRegistry {
    handlers: RwLock<HashMap<String, Vec<FanoutHandlerSpec>>>,
}

impl FanoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event_type: &str, handler_id: &str, queue: Queue, options: JobOptions) -> Result<(), FanoutRegisterError> {
        if event_type.is_empty() {
            return Err(FanoutRegisterError::EmptyEventType);
        }
        if handler_id.is_empty() {
            return Err(FanoutRegisterError::EmptyHandlerId);
        }

        let mut handlers = self.handlers.write().expect("fanout registry lock poisoned");
        let entries = handlers.entry(event_type.to_string()).or_default();
        if entries.iter().any(|h| h.id == handler_id) {
            return Err(FanoutRegisterError::DuplicateHandler(handler_id.to_string(), event_type.to_string()));
        }
        entries.push(FanoutHandlerSpec { id: handler_id.to_string(), queue, options });
        Ok(())
    }

    pub fn handlers_for(&self, event_type: &str) -> Vec<FanoutHandlerSpec> {
        self.handlers.read().expect("fanout registry lock poisoned").get(event_type).cloned().unwrap_or_default()
    }
}

/// Enqueues one task per registered handler for `event.event_type`, with
/// task type `fanout:{eventType}:{handlerID}`. Returns the per-handler
/// enqueue errors; an empty vec means full success, a partial vec is a
/// legitimate partial-success outcome (P7: handler A's failure never
/// blocks handler B's enqueue).
pub async fn fanout(client: &WorkerClient, registry: &FanoutRegistry, event: FanoutEvent) -> Vec<(String, crate::error::Error)> {
    let event = event.stamped();
    let handlers = registry.handlers_for(&event.event_type);
    let mut errors = Vec::new();

    for handler in handlers {
        let task_type = format!("fanout:{}:{}", event.event_type, handler.id);
        if let Err(err) = client.enqueue(task_type, event.payload.clone(), handler.queue, handler.options.clone()).await {
            errors.push((handler.id, err));
        }
    }

    errors
}

/// Worker-side counterpart: given a dispatched task type of the form
/// `fanout:{eventType}:{handlerID}`, looks up the matching handler in the
/// same registry and invokes it. A malformed type or missing handler is
/// a skip-retry — there is no safe way to retry into a handler that no
/// longer exists.
pub struct FanoutDispatcher<F> {
    registry: std::sync::Arc<FanoutRegistry>,
    invoke: F,
}

impl<F> FanoutDispatcher<F>
where
    F: Fn(&str, &str, &[u8]) -> Result<(), WorkerError> + Send + Sync,
{
    pub fn new(registry: std::sync::Arc<FanoutRegistry>, invoke: F) -> Self {
        Self { registry, invoke }
    }

    pub fn dispatch(&self, task_type: &str, payload: &[u8]) -> Result<(), WorkerError> {
        let mut parts = task_type.splitn(3, ':');
        let prefix = parts.next().unwrap_or_default();
        let event_type = parts.next().unwrap_or_default();
        let handler_id = parts.next().unwrap_or_default();

        if prefix != "fanout" || event_type.is_empty() || handler_id.is_empty() {
            return Err(WorkerError::skip_retry(format!("malformed fanout task type: {task_type}")));
        }

        let known = self.registry.handlers_for(event_type).into_iter().any(|h| h.id == handler_id);
        if !known {
            return Err(WorkerError::skip_retry(format!("no handler '{handler_id}' registered for event '{event_type}'")));
        }

        (self.invoke)(event_type, handler_id, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::queue::WeightedQueue;

    #[test]
    fn register_rejects_empty_event_type_and_handler_id() {
        let registry = FanoutRegistry::new();
        assert_eq!(registry.register("", "h", Queue::Low, JobOptions::default()), Err(FanoutRegisterError::EmptyEventType));
        assert_eq!(registry.register("user:created", "", Queue::Low, JobOptions::default()), Err(FanoutRegisterError::EmptyHandlerId));
    }

    #[test]
    fn register_rejects_duplicate_event_handler_pairs() {
        let registry = FanoutRegistry::new();
        registry.register("user:created", "hA", Queue::Critical, JobOptions::default()).unwrap();
        let result = registry.register("user:created", "hA", Queue::Low, JobOptions::default());
        assert!(matches!(result, Err(FanoutRegisterError::DuplicateHandler(_, _))));
    }

    #[tokio::test]
    async fn fanout_enqueues_one_task_per_registered_handler() {
        let registry = FanoutRegistry::new();
        registry.register("user:created", "hA", Queue::Critical, JobOptions::default()).unwrap();
        registry.register("user:created", "hB", Queue::Low, JobOptions::default()).unwrap();

        let (sender, mut queue) = WeightedQueue::bounded(16);
        let client = WorkerClient::new(sender);

        let errors = fanout(&client, &registry, FanoutEvent::new("user:created", vec![1])).await;
        assert!(errors.is_empty());

        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(queue.recv().await.unwrap().task_type);
        }
        seen.sort();
        assert_eq!(seen, vec!["fanout:user:created:hA", "fanout:user:created:hB"]);
    }

    #[test]
    fn dispatcher_skip_retries_on_malformed_or_unknown_task_type() {
        let registry = std::sync::Arc::new(FanoutRegistry::new());
        let dispatcher = FanoutDispatcher::new(registry, |_e, _h, _p| Ok(()));

        assert!(dispatcher.dispatch("not-a-fanout-task", &[]).is_err());
        assert!(dispatcher.dispatch("fanout:user:created:unknown", &[]).is_err());
    }

    #[test]
    fn dispatcher_invokes_the_matching_handler() {
        let registry = std::sync::Arc::new(FanoutRegistry::new());
        registry.register("user:created", "hA", Queue::Critical, JobOptions::default()).unwrap();
        let dispatcher = FanoutDispatcher::new(registry, |event_type, handler_id, _payload| {
            assert_eq!(event_type, "user:created");
            assert_eq!(handler_id, "hA");
            Ok(())
        });
        assert!(dispatcher.dispatch("fanout:user:created:hA", &[]).is_ok());
    }
}
