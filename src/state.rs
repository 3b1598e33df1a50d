//! Shared application state handed to every route handler via axum's
//! `State` extractor, holding exactly the ports this crate's components
//! need: a `Querier` for the readiness probe, the metrics registry, and
//! the worker enqueue client.

use std::sync::Arc;

use crate::config::Config;
use crate::db::Querier;
use crate::observability::Metrics;
use crate::worker::WorkerClient;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    metrics: Arc<Metrics>,
    db: Option<Arc<dyn Querier>>,
    worker: Option<WorkerClient>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let metrics = Arc::new(Metrics::new(config.observability.latency_buckets_ms.clone()));
        Self { config: Arc::new(config), metrics, db: None, worker: None }
    }

    pub fn with_db(mut self, db: Arc<dyn Querier>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_worker(mut self, worker: WorkerClient) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn db(&self) -> Option<&Arc<dyn Querier>> {
        self.db.as_ref()
    }

    pub fn worker(&self) -> Option<&WorkerClient> {
        self.worker.as_ref()
    }
}
