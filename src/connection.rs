//! Connection management and setup deduplication
//!
//! One [`ConnectionManager`] owns the engine handle for a whole session. The
//! handle is bootstrapped lazily and exactly once: concurrent callers share a
//! single in-flight future, and the outcome (success *or* failure) stays cached
//! for every later caller. Extension installation and dataset registration use
//! the same write-once-per-key discipline, which is the sole concurrency
//! control in this layer — a per-key mutex implemented via shared futures.
//!
//! No suspension point here carries a timeout: a hung bootstrap or install
//! blocks every dependent query until the session ends.

use crate::engine::{EngineFactory, SqlEngine};
use crate::error::{LakeviewError, Result};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

type SharedResult<T> = std::result::Result<T, Arc<LakeviewError>>;
type ConnectFuture = Shared<BoxFuture<'static, SharedResult<Arc<dyn SqlEngine>>>>;
type SetupFuture = Shared<BoxFuture<'static, SharedResult<()>>>;

/// Quoted file-path literals that name a dataset, e.g. `FROM 'flights.parquet'`.
/// A lightweight heuristic over the SQL text, not a parser and not a security
/// boundary.
const DATASET_LITERAL: &str = r"'([^']+\.(?:parquet|csv|json))'";

/// Owns the singleton engine connection plus the extension-install and
/// dataset-registration caches.
pub struct ConnectionManager {
    factory: EngineFactory,
    /// Base location prepended to dataset names at registration time
    data_root: String,
    connect: Mutex<Option<ConnectFuture>>,
    extensions: Mutex<HashMap<String, SetupFuture>>,
    datasets: Mutex<HashMap<String, SetupFuture>>,
}

impl ConnectionManager {
    /// Create a manager around an engine factory. The factory is not invoked
    /// until the first [`connect`](Self::connect).
    pub fn new<F>(factory: F) -> Arc<Self>
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn SqlEngine>>> + Send + Sync + 'static,
    {
        Arc::new(ConnectionManager {
            factory: Box::new(factory),
            data_root: "/data".to_string(),
            connect: Mutex::new(None),
            extensions: Mutex::new(HashMap::new()),
            datasets: Mutex::new(HashMap::new()),
        })
    }

    /// Create a manager with a custom dataset base location.
    pub fn with_data_root<F>(factory: F, data_root: impl Into<String>) -> Arc<Self>
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn SqlEngine>>> + Send + Sync + 'static,
    {
        Arc::new(ConnectionManager {
            factory: Box::new(factory),
            data_root: data_root.into(),
            connect: Mutex::new(None),
            extensions: Mutex::new(HashMap::new()),
            datasets: Mutex::new(HashMap::new()),
        })
    }

    /// Get the live engine handle, bootstrapping it on first use.
    ///
    /// Initialization is single-flight: while a bootstrap is in flight every
    /// caller awaits the same future, and its outcome is cached for the rest
    /// of the session. A failed bootstrap therefore surfaces to all pending
    /// and future queries without being retried.
    pub async fn connect(self: &Arc<Self>) -> Result<Arc<dyn SqlEngine>> {
        let fut = {
            let mut slot = self.connect.lock();
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    info!("bootstrapping engine connection");
                    let bootstrap = (self.factory)();
                    let fut: ConnectFuture = async move {
                        bootstrap.await.map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };
        fut.await.map_err(LakeviewError::shared)
    }

    /// Install and load an engine extension, at most once per name.
    ///
    /// `INSTALL` and `LOAD` are idempotent on the engine side but slow, so
    /// concurrent and repeated requests for the same extension all await one
    /// shared setup future.
    pub async fn load_extension(self: &Arc<Self>, name: &str) -> Result<()> {
        let fut = {
            let mut map = self.extensions.lock();
            match map.get(name) {
                Some(existing) => existing.clone(),
                None => {
                    let manager = Arc::clone(self);
                    let ext = name.to_string();
                    let fut: SetupFuture = async move {
                        info!(extension = %ext, "installing engine extension");
                        let engine = manager.connect().await.map_err(Arc::new)?;
                        install_extension(engine.as_ref(), &ext)
                            .await
                            .map_err(Arc::new)?;
                        Ok(())
                    }
                    .boxed()
                    .shared();
                    map.insert(name.to_string(), fut.clone());
                    fut
                }
            }
        };
        fut.await.map_err(LakeviewError::shared)
    }

    /// Register a dataset file with the engine, at most once per name. The
    /// byte-source URL is resolved as `<data_root>/<name>`.
    pub async fn register_dataset(self: &Arc<Self>, name: &str) -> Result<()> {
        let url = format!("{}/{}", self.data_root, name);
        self.register_dataset_url(name, &url).await
    }

    /// Register a dataset under an explicit byte-source URL. Idempotent per
    /// unique name: a second call with the same name awaits the first
    /// registration instead of starting a duplicate fetch.
    pub async fn register_dataset_url(self: &Arc<Self>, name: &str, url: &str) -> Result<()> {
        let fut = {
            let mut map = self.datasets.lock();
            match map.get(name) {
                Some(existing) => existing.clone(),
                None => {
                    let manager = Arc::clone(self);
                    let dataset = name.to_string();
                    let url = url.to_string();
                    let fut: SetupFuture = async move {
                        info!(dataset = %dataset, url = %url, "registering dataset");
                        let engine = manager.connect().await.map_err(Arc::new)?;
                        engine
                            .register_file(&dataset, &url)
                            .await
                            .map_err(|e| {
                                Arc::new(LakeviewError::Dataset {
                                    name: dataset.clone(),
                                    reason: e.to_string(),
                                })
                            })?;
                        Ok(())
                    }
                    .boxed()
                    .shared();
                    map.insert(name.to_string(), fut.clone());
                    fut
                }
            }
        };
        fut.await.map_err(LakeviewError::shared)
    }

    /// Scan SQL text for dataset file-path literals and register each one.
    pub async fn ensure_datasets(self: &Arc<Self>, sql: &str) -> Result<()> {
        let pattern = Regex::new(DATASET_LITERAL)
            .map_err(|e| LakeviewError::Query(format!("invalid dataset pattern: {}", e)))?;
        for capture in pattern.captures_iter(sql) {
            if let Some(name) = capture.get(1) {
                debug!(dataset = %name.as_str(), "dataset literal referenced by query");
                self.register_dataset(name.as_str()).await?;
            }
        }
        Ok(())
    }
}

async fn install_extension(engine: &dyn SqlEngine, name: &str) -> Result<()> {
    let wrap = |e: LakeviewError| LakeviewError::Extension {
        name: name.to_string(),
        reason: e.to_string(),
    };
    engine.query(&format!("INSTALL {};", name)).await.map_err(wrap)?;
    engine.query(&format!("LOAD {};", name)).await.map_err(wrap)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager_counting_bootstraps(
        engine: Arc<MockEngine>,
        bootstraps: Arc<AtomicUsize>,
    ) -> Arc<ConnectionManager> {
        ConnectionManager::new(move || {
            bootstraps.fetch_add(1, Ordering::SeqCst);
            let engine: Arc<dyn SqlEngine> = engine.clone();
            async move { Ok(engine) }.boxed()
        })
    }

    #[tokio::test]
    async fn test_connect_bootstraps_once() {
        let engine = MockEngine::new();
        let bootstraps = Arc::new(AtomicUsize::new(0));
        let manager = manager_counting_bootstraps(engine, bootstraps.clone());

        let (a, b) = tokio::join!(manager.connect(), manager.connect());
        assert!(a.is_ok() && b.is_ok());
        manager.connect().await.unwrap();
        assert_eq!(bootstraps.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let manager = ConnectionManager::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Err::<Arc<dyn SqlEngine>, _>(LakeviewError::Bootstrap("no runtime".to_string()))
            }
            .boxed()
        });

        assert!(manager.connect().await.is_err());
        let second = manager.connect().await;
        assert!(second.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1, "failed bootstrap must not retry");
    }

    #[tokio::test]
    async fn test_load_extension_installs_once() {
        let engine = MockEngine::new();
        let manager = manager_counting_bootstraps(engine.clone(), Arc::new(AtomicUsize::new(0)));

        let (a, b) = tokio::join!(
            manager.load_extension("spatial"),
            manager.load_extension("spatial")
        );
        a.unwrap();
        b.unwrap();
        manager.load_extension("spatial").await.unwrap();

        assert_eq!(engine.query_count("INSTALL spatial;"), 1);
        assert_eq!(engine.query_count("LOAD spatial;"), 1);
    }

    #[tokio::test]
    async fn test_register_dataset_once_per_key() {
        let engine = MockEngine::new();
        let manager = manager_counting_bootstraps(engine.clone(), Arc::new(AtomicUsize::new(0)));

        let (a, b) = tokio::join!(
            manager.register_dataset("flights.parquet"),
            manager.register_dataset("flights.parquet")
        );
        a.unwrap();
        b.unwrap();

        let registered = engine.registered();
        assert_eq!(registered.len(), 1);
        assert_eq!(
            registered[0],
            ("flights.parquet".to_string(), "/data/flights.parquet".to_string())
        );
    }

    #[tokio::test]
    async fn test_ensure_datasets_scans_literals() {
        let engine = MockEngine::new();
        let manager = manager_counting_bootstraps(engine.clone(), Arc::new(AtomicUsize::new(0)));

        manager
            .ensure_datasets(
                "SELECT * FROM 'flights.parquet' JOIN 'airports.parquet' ON x = y \
                 WHERE name = 'O''Hare'",
            )
            .await
            .unwrap();

        let names: Vec<String> = engine.registered().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["flights.parquet", "airports.parquet"]);
    }

    #[tokio::test]
    async fn test_data_root_override() {
        let engine = MockEngine::new();
        let inner = engine.clone();
        let manager = ConnectionManager::with_data_root(
            move || {
                let engine: Arc<dyn SqlEngine> = inner.clone();
                async move { Ok(engine) }.boxed()
            },
            "https://cdn.example.org/datasets",
        );

        manager.register_dataset("grid.csv").await.unwrap();
        assert_eq!(
            engine.registered()[0].1,
            "https://cdn.example.org/datasets/grid.csv"
        );
    }
}
