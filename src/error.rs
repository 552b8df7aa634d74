//! Error types for lakeview
//!
//! This module defines the main error type used throughout lakeview. Runtime
//! query failures are normally recovered into the reactive `error` field of a
//! query's state; only programmer errors (such as asking for an unregistered
//! dataset) surface as a hard `Err` at call time.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for lakeview operations
pub type Result<T> = std::result::Result<T, LakeviewError>;

/// Main error type for lakeview
#[derive(Error, Debug)]
pub enum LakeviewError {
    /// The embedded engine or its runtime could not initialize
    #[error("connection bootstrap failed: {0}")]
    Bootstrap(String),

    /// An engine extension failed to install or load
    #[error("extension '{name}' failed to load: {reason}")]
    Extension { name: String, reason: String },

    /// A dataset could not be fetched or registered with the engine
    #[error("dataset '{name}' failed to register: {reason}")]
    Dataset { name: String, reason: String },

    /// The engine rejected a statement
    #[error("query failed: {0}")]
    Query(String),

    /// A dataset name was requested that was never registered
    #[error("unknown dataset \"{name}\". Registered: {}", .known.join(", "))]
    UnknownDataset { name: String, known: Vec<String> },

    /// A failure that was cached by a single-flight setup future and is being
    /// surfaced to a later caller of the same key
    #[error(transparent)]
    Setup(Arc<LakeviewError>),
}

impl LakeviewError {
    /// Wrap a cached setup failure for re-surfacing to another caller.
    pub(crate) fn shared(err: Arc<LakeviewError>) -> Self {
        LakeviewError::Setup(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_dataset_lists_known_names() {
        let err = LakeviewError::UnknownDataset {
            name: "flighs".to_string(),
            known: vec!["flights".to_string(), "airports".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("flighs"));
        assert!(msg.contains("flights, airports"));
    }

    #[test]
    fn test_shared_error_is_transparent() {
        let inner = Arc::new(LakeviewError::Bootstrap("worker died".to_string()));
        let outer = LakeviewError::shared(inner);
        assert_eq!(outer.to_string(), "connection bootstrap failed: worker died");
    }
}
