//! The observability spine (C11): structured logging, bounded-cardinality
//! metrics, and span propagation.

pub mod metrics;
pub mod tracing;

pub use metrics::Metrics;
pub use tracing::{init_tracing, shutdown_tracing};
