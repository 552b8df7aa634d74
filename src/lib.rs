#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Lakeview
//!
//! Lakeview is a client-side analytical query layer: declare filterable,
//! sortable, aggregatable views over tabular datasets backed by an embedded
//! columnar SQL engine, without hand-writing SQL for the common cases.
//!
//! ## Features
//!
//! - **Composable fragments**: pure predicate constructors (`ilike`, `between`,
//!   `in_list`, `eq`, `and`, `or`) that drop out of the query when inactive
//! - **Immutable builder**: chainable filter / arrange / select / mutate verbs;
//!   a base builder can be shared safely across derived views
//! - **Rich materializations**: rows, head, describe, glimpse, count, distinct,
//!   min/max, summarize, slice_max/slice_min, raw SQL escape hatch
//! - **Reactive execution**: queries re-run on change notification and expose
//!   `rows` / `loading` / `error` / query timing, stale-while-revalidate
//! - **Single-flight setup**: one lazily-bootstrapped engine connection;
//!   extension installs and dataset registrations deduplicated per key
//!
//! ## Quick start
//!
//! ```no_run
//! use lakeview::{Database, DatabaseOptions, ConnectionManager, ilike, or};
//! use futures::FutureExt;
//!
//! # fn bootstrap() -> std::sync::Arc<dyn lakeview::SqlEngine> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> lakeview::Result<()> {
//!     // The factory runs once, on the first query.
//!     let conn = ConnectionManager::new(|| {
//!         async { Ok(bootstrap()) }.boxed()
//!     });
//!
//!     let db = Database::open(
//!         conn,
//!         [("papers", "papers.parquet")],
//!         DatabaseOptions::default(),
//!     );
//!
//!     let papers = db.from("papers")?;
//!     let filtered = papers
//!         .between("year", || Some((2010.0, 2024.0)), Some((1990.0, 2024.0)))
//!         .filter(|| or([ilike("title", "graph"), ilike("abstract", "graph")]));
//!
//!     let rows = filtered.rows();
//!     rows.refresh().await;
//!     println!("{} rows in {} ms", rows.rows().len(), rows.query_time_ms());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐    ┌───────────────┐    ┌──────────────────┐
//! │ Fragment       │───▶│ DatasetQuery  │───▶│ ReactiveQuery    │
//! │ (predicates)   │    │ (builder)     │    │ (execution)      │
//! └────────────────┘    └───────────────┘    └────────┬─────────┘
//!                                                     │
//!                                            ┌────────▼─────────┐
//!                                            │ ConnectionManager│
//!                                            │ (single-flight)  │
//!                                            └────────┬─────────┘
//!                                                     │
//!                                            ┌────────▼─────────┐
//!                                            │ SqlEngine (trait)│
//!                                            └──────────────────┘
//! ```
//!
//! Modules:
//!
//! - [`fragment`]: pure SQL predicate constructors
//! - [`builder`]: the immutable query builder and its materializations
//! - [`reactive`]: reactive execution and the scalar/column derived views
//! - [`connection`]: connection bootstrap and setup deduplication
//! - [`database`]: the name → dataset-path registry
//! - [`engine`]: the opaque engine seam
//! - [`value`]: result cells and rows
//! - [`testing`]: scripted mock engine for tests
//! - [`error`]: error types and Result alias

pub mod builder;
pub mod connection;
pub mod database;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod reactive;
pub mod testing;
pub mod value;

pub use builder::{DatasetQuery, Glimpse, GlimpseColumn, SliceOpts};
pub use connection::ConnectionManager;
pub use database::{Database, DatabaseOptions};
pub use engine::{EngineFactory, SqlEngine};
pub use error::{LakeviewError, Result};
pub use fragment::{and, between, desc, eq, ilike, in_list, or, Fragment};
pub use reactive::{ColumnQuery, QuerySnapshot, ReactiveQuery, ScalarQuery};
pub use value::{Row, Value};
