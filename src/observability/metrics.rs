//! Prometheus-compatible metrics collectors with bounded label cardinality
//! (§4.3, §4.11).
//!
//! Routing through a full OpenTelemetry meter provider would be overkill
//! for the closed, hand-countable label set this crate needs (route
//! template × whitelisted method × status, and task type × queue ×
//! status). A small `std::sync::atomic` + `dashmap` registry, encoded to
//! Prometheus text format on demand by the `/metrics` handler, keeps
//! that guarantee explicit in code rather than delegated to an
//! exporter's own aggregation rules.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// HTTP methods recognized as their own label value; anything else
/// collapses to `OTHER` (§4.3).
const ALLOWED_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Label value used for any request path that did not match a registered
/// route (§4.3, P9): bounds cardinality regardless of how many distinct
/// garbage paths an attacker sends.
pub const UNMATCHED_ROUTE: &str = "unmatched";

pub fn normalize_method(method: &str) -> &'static str {
    ALLOWED_METHODS.iter().find(|&&m| m == method).copied().unwrap_or("OTHER")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HttpKey {
    method: &'static str,
    route: String,
    status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JobKey {
    task_type: String,
    queue: String,
    status: &'static str,
}

#[derive(Debug, Default)]
struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new(bounds_ms: &[f64]) -> Self {
        Self { buckets: bounds_ms.iter().map(|&b| (b, AtomicU64::new(0))).collect(), sum_micros: AtomicU64::new(0), count: AtomicU64::new(0) }
    }

    fn observe(&self, value_ms: f64) {
        for (bound, counter) in &self.buckets {
            if value_ms <= *bound {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.sum_micros.fetch_add((value_ms * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Process-wide HTTP and worker metrics registry. Created once at startup
/// and shared via application state (§9 design note: "singleton
/// tracer/metrics registry ... passed by reference to consumers").
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

struct Inner {
    latency_buckets_ms: Vec<f64>,
    http_requests: DashMap<HttpKey, AtomicU64>,
    http_duration: DashMap<(&'static str, String), Histogram>,
    job_processed: DashMap<JobKey, AtomicU64>,
    job_duration: DashMap<(String, String), Histogram>,
}

impl Metrics {
    pub fn new(latency_buckets_ms: Vec<f64>) -> Self {
        Self {
            inner: Arc::new(Inner {
                latency_buckets_ms,
                http_requests: DashMap::new(),
                http_duration: DashMap::new(),
                job_processed: DashMap::new(),
                job_duration: DashMap::new(),
            }),
        }
    }

    /// Records one completed HTTP request. `route` must already be the
    /// matched route template (or [`UNMATCHED_ROUTE`]), never a raw path.
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_ms: f64) {
        let method = normalize_method(method);
        self.inner
            .http_requests
            .entry(HttpKey { method, route: route.to_string(), status })
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        self.inner
            .http_duration
            .entry((method, route.to_string()))
            .or_insert_with(|| Histogram::new(&self.inner.latency_buckets_ms))
            .observe(duration_ms);
    }

    pub fn record_job_processed(&self, task_type: &str, queue: &str, success: bool, duration_ms: f64) {
        let status = if success { "success" } else { "failed" };
        self.inner
            .job_processed
            .entry(JobKey { task_type: task_type.to_string(), queue: queue.to_string(), status })
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        self.inner
            .job_duration
            .entry((task_type.to_string(), queue.to_string()))
            .or_insert_with(|| Histogram::new(&self.inner.latency_buckets_ms))
            .observe(duration_ms);
    }

    /// Renders all collected series in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut out = String::new();

        out.push_str("# TYPE http_requests_total counter\n");
        for entry in self.inner.http_requests.iter() {
            let key = entry.key();
            out.push_str(&format!(
                "http_requests_total{{method=\"{}\",route=\"{}\",status=\"{}\"}} {}\n",
                key.method,
                key.route,
                key.status,
                entry.value().load(Ordering::Relaxed)
            ));
        }

        out.push_str("# TYPE http_request_duration_seconds histogram\n");
        for entry in self.inner.http_duration.iter() {
            let (method, route) = entry.key();
            Self::encode_histogram(&mut out, "http_request_duration_seconds", &format!("method=\"{method}\",route=\"{route}\""), entry.value());
        }

        out.push_str("# TYPE job_processed_total counter\n");
        for entry in self.inner.job_processed.iter() {
            let key = entry.key();
            out.push_str(&format!(
                "job_processed_total{{task_type=\"{}\",queue=\"{}\",status=\"{}\"}} {}\n",
                key.task_type,
                key.queue,
                key.status,
                entry.value().load(Ordering::Relaxed)
            ));
        }

        out.push_str("# TYPE job_duration_seconds histogram\n");
        for entry in self.inner.job_duration.iter() {
            let (task_type, queue) = entry.key();
            Self::encode_histogram(&mut out, "job_duration_seconds", &format!("task_type=\"{task_type}\",queue=\"{queue}\""), entry.value());
        }

        out
    }

    fn encode_histogram(out: &mut String, name: &str, labels: &str, histogram: &Histogram) {
        let mut cumulative = 0u64;
        for (bound, counter) in &histogram.buckets {
            cumulative = cumulative.max(counter.load(Ordering::Relaxed));
            out.push_str(&format!("{name}_bucket{{{labels},le=\"{bound}\"}} {cumulative}\n"));
        }
        let count = histogram.count.load(Ordering::Relaxed);
        out.push_str(&format!("{name}_bucket{{{labels},le=\"+Inf\"}} {count}\n"));
        out.push_str(&format!("{name}_sum{{{labels}}} {}\n", histogram.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0));
        out.push_str(&format!("{name}_count{{{labels}}} {count}\n"));
    }
}
