//! Testing utilities for lakeview
//!
//! A scripted in-memory [`SqlEngine`] for unit and integration tests: canned
//! responses keyed by SQL substring, injectable failures and delays, and a
//! record of every statement and file registration the layer performed.
//!
//! # Example
//!
//! ```
//! use lakeview::testing::{row, MockEngine};
//! use lakeview::{DatasetQuery, Value};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = MockEngine::new();
//! engine.respond("COUNT(*)", vec![row(&[("n", Value::Int(7))])]);
//!
//! let count = DatasetQuery::new(engine.manager(), "'t.parquet'").count();
//! count.refresh().await;
//! assert_eq!(count.value(), Value::Int(7));
//! # }
//! ```

use crate::connection::ConnectionManager;
use crate::engine::SqlEngine;
use crate::error::{LakeviewError, Result};
use crate::value::{Row, Value};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Build a [`Row`] from `(column, value)` pairs.
pub fn row(cells: &[(&str, Value)]) -> Row {
    cells
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Scripted engine: the first matching failure wins, then the first matching
/// response; anything else returns an empty result set.
#[derive(Default)]
pub struct MockEngine {
    responses: Mutex<Vec<(String, Vec<Row>)>>,
    failures: Mutex<Vec<(String, String)>>,
    delays: Mutex<Vec<(String, Duration)>>,
    queries: Mutex<Vec<String>>,
    registered: Mutex<Vec<(String, String)>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(MockEngine::default())
    }

    /// Return `rows` for any statement containing `needle`.
    pub fn respond(&self, needle: &str, rows: Vec<Row>) {
        self.responses.lock().push((needle.to_string(), rows));
    }

    /// Fail any statement containing `needle` with a query error.
    pub fn fail(&self, needle: &str, message: &str) {
        self.failures
            .lock()
            .push((needle.to_string(), message.to_string()));
    }

    /// Sleep before answering any statement containing `needle`.
    pub fn delay(&self, needle: &str, duration: Duration) {
        self.delays.lock().push((needle.to_string(), duration));
    }

    /// Every statement executed, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// How many executed statements contain `needle`.
    pub fn query_count(&self, needle: &str) -> usize {
        self.queries
            .lock()
            .iter()
            .filter(|sql| sql.contains(needle))
            .count()
    }

    /// Every `(name, url)` file registration, in order.
    pub fn registered(&self) -> Vec<(String, String)> {
        self.registered.lock().clone()
    }

    /// A connection manager whose bootstrap hands out this engine.
    pub fn manager(self: &Arc<Self>) -> Arc<ConnectionManager> {
        let engine = Arc::clone(self);
        ConnectionManager::new(move || {
            let engine: Arc<dyn SqlEngine> = engine.clone();
            async move { Ok(engine) }.boxed()
        })
    }
}

#[async_trait]
impl SqlEngine for MockEngine {
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.queries.lock().push(sql.to_string());

        let delay = self
            .delays
            .lock()
            .iter()
            .find(|(needle, _)| sql.contains(needle))
            .map(|(_, duration)| *duration);
        if let Some(duration) = delay {
            tokio::time::sleep(duration).await;
        }

        let failure = self
            .failures
            .lock()
            .iter()
            .find(|(needle, _)| sql.contains(needle))
            .map(|(_, message)| message.clone());
        if let Some(message) = failure {
            return Err(LakeviewError::Query(message));
        }

        let rows = self
            .responses
            .lock()
            .iter()
            .find(|(needle, _)| sql.contains(needle))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Ok(rows)
    }

    async fn register_file(&self, name: &str, url: &str) -> Result<()> {
        self.registered
            .lock()
            .push((name.to_string(), url.to_string()));
        Ok(())
    }
}
