//! The job/worker runtime (C8, §4.8): a priority-weighted queue feeding
//! a fixed Recovery → Tracing → Metrics → Logging processing chain, plus
//! the enqueue-side client and a handful of higher-level dispatch
//! patterns built on top of it.

pub mod client;
pub mod dead_letter;
pub mod error;
pub mod idempotency;
pub mod job;
pub mod patterns;
pub mod queue;
pub mod server;

pub use client::WorkerClient;
pub use dead_letter::{DeadLetter, DeadLetterStore, InMemoryDeadLetterStore};
pub use error::WorkerError;
pub use idempotency::{GuardDecision, IdempotencyGuard, IdempotencyStore, IdempotentHandler, KeyExtractor, RedisIdempotencyStore};
pub use job::{Job, JobOptions, Queue};
pub use queue::{QueueSender, WeightedQueue};
pub use server::{JobHandler, WorkerServer};
