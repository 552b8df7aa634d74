//! Reactive query execution
//!
//! A [`ReactiveQuery`] owns a SQL-producing closure and keeps one live result
//! whose lifecycle is driven by explicit change notification: call
//! [`refresh`](ReactiveQuery::refresh) directly, or [`attach`](ReactiveQuery::attach)
//! the query to a `tokio::sync::watch` channel whose sender bumps on every
//! input change. The closure is re-evaluated on every run, so filter thunks
//! always see the caller's current state.
//!
//! While a re-run is in flight the previous rows stay visible with
//! `loading = true` — stale-while-revalidate. Runs carry a monotonically
//! increasing id and a completion older than the newest applied one is
//! discarded, so out-of-order completions can never roll the result backwards.

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Observable state of one reactive query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySnapshot {
    /// Result rows of the newest applied run (stale during `loading`)
    pub rows: Vec<Row>,
    /// True from the moment a run is triggered until its outcome is applied
    pub loading: bool,
    /// Failure description of the newest applied run, if it failed
    pub error: Option<String>,
    /// Engine round-trip wall-clock time in milliseconds, two fractional
    /// digits, updated on success only
    pub query_time_ms: f64,
    /// Id of the newest applied run
    pub last_request_id: u64,
}

impl Default for QuerySnapshot {
    fn default() -> Self {
        QuerySnapshot {
            rows: Vec::new(),
            loading: true,
            error: None,
            query_time_ms: 0.0,
            last_request_id: 0,
        }
    }
}

struct QueryInner {
    conn: Arc<ConnectionManager>,
    build_sql: Box<dyn Fn() -> String + Send + Sync>,
    /// Extensions declared up front; ensured before every dispatch
    extensions: Vec<String>,
    state: watch::Sender<QuerySnapshot>,
    run_seq: AtomicU64,
    applied: AtomicU64,
}

/// A live query: re-runs its generated SQL on demand and publishes
/// rows / loading / error / timing state
#[derive(Clone)]
pub struct ReactiveQuery {
    inner: Arc<QueryInner>,
}

impl ReactiveQuery {
    /// Create a query over a SQL-producing closure. No run is started; call
    /// [`refresh`](Self::refresh) or [`attach`](Self::attach).
    pub fn new<F>(conn: Arc<ConnectionManager>, extensions: Vec<String>, build_sql: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(QuerySnapshot::default());
        ReactiveQuery {
            inner: Arc::new(QueryInner {
                conn,
                build_sql: Box::new(build_sql),
                extensions,
                state,
                run_seq: AtomicU64::new(0),
                applied: AtomicU64::new(0),
            }),
        }
    }

    /// Force a run even when no declared input changed.
    pub async fn refresh(&self) {
        self.execute().await;
    }

    /// Spawn a task that runs the query once immediately and again on every
    /// change of the trigger channel. The task ends when the sender drops.
    pub fn attach<T: Send + Sync + 'static>(&self, mut trigger: watch::Receiver<T>) -> JoinHandle<()> {
        let query = self.clone();
        tokio::spawn(async move {
            query.execute().await;
            while trigger.changed().await.is_ok() {
                query.execute().await;
            }
        })
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot> {
        self.inner.state.subscribe()
    }

    /// Current state, cloned.
    pub fn snapshot(&self) -> QuerySnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.inner.state.borrow().rows.clone()
    }

    pub fn loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    pub fn query_time_ms(&self) -> f64 {
        self.inner.state.borrow().query_time_ms
    }

    /// One run: evaluate the SQL closure, mark loading, ensure setup work,
    /// dispatch, and apply the outcome unless a newer run already did.
    async fn execute(&self) {
        let inner = &self.inner;
        let id = inner.run_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let sql = (inner.build_sql)();

        // A newer run may have fully applied while this one was being set up;
        // writing `loading` now would strand it true with nothing in flight.
        if inner.applied.load(Ordering::SeqCst) > id {
            debug!(run = id, "skipping superseded query run");
            return;
        }

        inner.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let started = Instant::now();
        let outcome = self.dispatch(&sql).await;

        // Newest-wins: if a later run has already applied, drop this outcome.
        if inner.applied.fetch_max(id, Ordering::SeqCst) > id {
            debug!(run = id, "discarding superseded query run");
            return;
        }

        match outcome {
            Ok(rows) => {
                let elapsed = round2(started.elapsed().as_secs_f64() * 1000.0);
                debug!(run = id, rows = rows.len(), query_time_ms = elapsed, "query completed");
                inner.state.send_modify(|s| {
                    s.rows = rows;
                    s.error = None;
                    s.query_time_ms = elapsed;
                    s.loading = false;
                    s.last_request_id = id;
                });
            }
            Err(e) => {
                warn!(run = id, error = %e, "query failed");
                inner.state.send_modify(|s| {
                    s.rows = Vec::new();
                    s.error = Some(e.to_string());
                    s.loading = false;
                    s.last_request_id = id;
                });
            }
        }
    }

    async fn dispatch(&self, sql: &str) -> Result<Vec<Row>> {
        let inner = &self.inner;
        for extension in &inner.extensions {
            inner.conn.load_extension(extension).await?;
        }
        inner.conn.ensure_datasets(sql).await?;
        let engine = inner.conn.connect().await?;
        debug!(%sql, "dispatching query");
        let rows = engine.query(sql).await?;
        Ok(rows.into_iter().map(Row::normalized).collect())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Scalar view over a query: the first column of the first row, or a default
/// when the result set is empty or the cell is NULL
#[derive(Clone)]
pub struct ScalarQuery {
    query: ReactiveQuery,
    default: Value,
}

impl ScalarQuery {
    pub fn new(query: ReactiveQuery, default: Value) -> Self {
        ScalarQuery { query, default }
    }

    /// First column of the first row; the caller default when the result set
    /// is empty or the cell is NULL (aggregates over zero qualifying rows
    /// come back as a single NULL cell, not as an empty set).
    pub fn value(&self) -> Value {
        self.query
            .rows()
            .first()
            .and_then(|row| row.first_value().cloned())
            .filter(|value| !value.is_null())
            .unwrap_or_else(|| self.default.clone())
    }

    pub async fn refresh(&self) {
        self.query.refresh().await;
    }

    pub fn attach<T: Send + Sync + 'static>(&self, trigger: watch::Receiver<T>) -> JoinHandle<()> {
        self.query.attach(trigger)
    }

    pub fn loading(&self) -> bool {
        self.query.loading()
    }

    pub fn error(&self) -> Option<String> {
        self.query.error()
    }

    /// The underlying query, for snapshot or subscription access.
    pub fn query(&self) -> &ReactiveQuery {
        &self.query
    }
}

/// Single-column view over a query: the first column's values across all rows
#[derive(Clone)]
pub struct ColumnQuery {
    query: ReactiveQuery,
}

impl ColumnQuery {
    pub fn new(query: ReactiveQuery) -> Self {
        ColumnQuery { query }
    }

    pub fn items(&self) -> Vec<Value> {
        self.query
            .rows()
            .iter()
            .filter_map(|row| row.first_value().cloned())
            .collect()
    }

    pub async fn refresh(&self) {
        self.query.refresh().await;
    }

    pub fn attach<T: Send + Sync + 'static>(&self, trigger: watch::Receiver<T>) -> JoinHandle<()> {
        self.query.attach(trigger)
    }

    pub fn loading(&self) -> bool {
        self.query.loading()
    }

    pub fn error(&self) -> Option<String> {
        self.query.error()
    }

    pub fn query(&self) -> &ReactiveQuery {
        &self.query
    }
}
