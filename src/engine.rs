//! The seam to the embedded SQL engine
//!
//! The engine itself is an external collaborator: an opaque asynchronous
//! capability that executes SQL text and registers byte-sources under logical
//! file names. Everything above this trait (connection management, reactive
//! execution, the query builder) is engine-agnostic; extension installation
//! rides the ordinary query channel as `INSTALL x;` / `LOAD x;` statements.

use crate::error::Result;
use crate::value::Row;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// An asynchronous connection to an embedded columnar SQL engine.
///
/// Implementations must serialize statement execution internally (lakeview
/// interleaves queries from many views over one connection).
#[async_trait]
pub trait SqlEngine: Send + Sync {
    /// Execute one SQL statement and return its rows.
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Map a logical file name to a byte-source (local path or URL) so the
    /// name can appear in a `FROM '<name>'` clause.
    async fn register_file(&self, name: &str, url: &str) -> Result<()>;
}

/// Factory that bootstraps the engine: runtime acquisition, worker startup,
/// and the connection handshake. Invoked at most once per
/// [`ConnectionManager`](crate::connection::ConnectionManager).
pub type EngineFactory =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn SqlEngine>>> + Send + Sync>;
