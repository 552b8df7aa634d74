//! Named dataset registry
//!
//! A [`Database`] maps friendly names to dataset storage paths and hands out
//! [`DatasetQuery`] builders scoped to one dataset. Required engine extensions
//! are declared here eagerly but installed lazily, on the first query that
//! actually runs.

use crate::builder::DatasetQuery;
use crate::connection::ConnectionManager;
use crate::error::{LakeviewError, Result};
use crate::reactive::ReactiveQuery;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Options for [`Database::open`]
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    /// Engine extensions every query from this database depends on
    pub extensions: Vec<String>,
}

impl DatabaseOptions {
    pub fn with_extensions<I>(extensions: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        DatabaseOptions {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Immutable name → storage-path registry
pub struct Database {
    conn: Arc<ConnectionManager>,
    /// Registration order preserved for `tables()` and error messages
    registry: Vec<(String, String)>,
    extensions: Vec<String>,
}

impl Database {
    /// Build a registry over `(name, path)` pairs. Bare paths are quoted so
    /// they can be dropped straight into a `FROM` clause; already-quoted
    /// paths pass through unchanged.
    pub fn open<I, S>(conn: Arc<ConnectionManager>, tables: I, options: DatabaseOptions) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let registry = tables
            .into_iter()
            .map(|(name, path)| {
                let path = path.into();
                let quoted = if path.starts_with('\'') {
                    path
                } else {
                    format!("'{}'", path)
                };
                (name.into(), quoted)
            })
            .collect::<Vec<_>>();
        debug!(
            tables = registry.len(),
            extensions = options.extensions.len(),
            "opened dataset registry"
        );
        Database {
            conn,
            registry,
            extensions: options.extensions,
        }
    }

    /// Builder for a registered dataset. Asking for an unregistered name is a
    /// programmer error and fails immediately, listing the known names.
    pub fn from(&self, name: &str) -> Result<DatasetQuery> {
        let path = self
            .registry
            .iter()
            .find(|(table, _)| table == name)
            .map(|(_, path)| path.clone())
            .ok_or_else(|| LakeviewError::UnknownDataset {
                name: name.to_string(),
                known: self.tables().iter().map(|t| t.to_string()).collect(),
            })?;
        Ok(DatasetQuery::with_extensions(
            Arc::clone(&self.conn),
            path,
            self.extensions.clone(),
        ))
    }

    /// Raw SQL with every registered table available. The closure receives the
    /// name → quoted-path map, so multi-table statements can interpolate paths
    /// by name.
    pub fn sql<F>(&self, build: F) -> ReactiveQuery
    where
        F: Fn(&HashMap<String, String>) -> String + Send + Sync + 'static,
    {
        let tables: HashMap<String, String> = self.registry.iter().cloned().collect();
        ReactiveQuery::new(Arc::clone(&self.conn), self.extensions.clone(), move || {
            build(&tables)
        })
    }

    /// Registered dataset names, in registration order.
    pub fn tables(&self) -> Vec<&str> {
        self.registry.iter().map(|(name, _)| name.as_str()).collect()
    }
}
