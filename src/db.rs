//! Transaction-scoped database ports (C7).
//!
//! These are pure ports: the core depends on them, never on a concrete
//! driver. Concrete adapters (Postgres, SurrealDB, Turso, ...) are the
//! application's responsibility to provide — out of scope here, same as
//! SQL schemas and migrations (§1 Non-goals). Return types are
//! intentionally opaque (`serde_json::Value`) to keep this boundary free
//! of any specific driver's row/result types, following the same
//! async-trait-port pattern used at the other infrastructure seams in
//! this crate.

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::Result;

/// A unit of work run inside [`TxManager::with_tx`].
pub type TxWork<'a> = Box<dyn for<'b> FnOnce(&'b dyn Querier) -> BoxFuture<'b, Result<()>> + Send + 'a>;

/// A single statement executor, scoped to either the ambient connection
/// pool or an in-flight transaction.
#[async_trait]
pub trait Querier: Send + Sync {
    /// Runs a statement that does not return rows, returning the number
    /// of affected rows.
    async fn exec(&self, sql: &str, args: &[serde_json::Value]) -> Result<u64>;

    /// Runs a statement returning zero or more rows.
    async fn query(&self, sql: &str, args: &[serde_json::Value]) -> Result<Vec<serde_json::Value>>;

    /// Runs a statement expected to return exactly one row.
    async fn query_row(&self, sql: &str, args: &[serde_json::Value]) -> Result<serde_json::Value>;
}

/// Scopes a closure to a single transaction: commits iff the closure
/// returns `Ok`, rolls back on `Err` or panic (P5). A panic inside the
/// closure is re-propagated after rollback, so a deferred-release
/// discipline holds even when the work panics (§9).
#[async_trait]
pub trait TxManager: Send + Sync {
    async fn with_tx<'a>(&self, f: TxWork<'a>) -> Result<()>;
}
