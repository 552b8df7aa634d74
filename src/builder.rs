//! Immutable, chainable query builder
//!
//! A [`DatasetQuery`] accumulates declarative view state — filters, ordering,
//! projection, computed columns — and translates it to SQL text on demand. It
//! never executes anything itself; each materialization method builds one
//! complete statement and hands it to a [`ReactiveQuery`].
//!
//! Every chain method returns a *new* builder and leaves the receiver
//! untouched, so a base builder can be shared safely across derived views.
//! Filter thunks are re-evaluated on every SQL build (never memoized), which
//! keeps generated statements in step with the caller's current inputs.
//!
//! Usage:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use lakeview::{ConnectionManager, DatasetQuery, ilike, or};
//! # fn example(conn: Arc<ConnectionManager>, search: Arc<parking_lot::Mutex<String>>) {
//! let papers = DatasetQuery::new(conn, "'papers.parquet'");
//!
//! let filtered = papers
//!     .between("year", || Some((2010.0, 2020.0)), None)
//!     .filter(move || {
//!         let term = search.lock().clone();
//!         or([ilike("title", &term), ilike("author", &term)])
//!     });
//!
//! let rows = filtered.rows();
//! let by_college = filtered.count_by(&["college"]);
//! # }
//! ```

use crate::connection::ConnectionManager;
use crate::fragment::{self, Fragment};
use crate::reactive::{ColumnQuery, ReactiveQuery, ScalarQuery};
use crate::value::Value;
use std::sync::Arc;
use tokio::sync::watch;

type FilterThunk = Arc<dyn Fn() -> Fragment + Send + Sync>;

/// Rows shown by [`DatasetQuery::head_default`], tibble-style.
const DEFAULT_HEAD: usize = 6;

/// Options for [`DatasetQuery::slice_max`] / [`DatasetQuery::slice_min`]
#[derive(Debug, Clone, Default)]
pub struct SliceOpts {
    /// Partition columns; empty means one global slice
    pub by: Vec<String>,
    /// Include all rows tied at the cutoff instead of truncating arbitrarily.
    /// Only meaningful with `by`; the ungrouped path truncates via `LIMIT`.
    pub with_ties: bool,
}

impl SliceOpts {
    /// Slice within groups of the given columns.
    pub fn by<I>(columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        SliceOpts {
            by: columns.into_iter().map(Into::into).collect(),
            with_ties: false,
        }
    }

    /// Keep boundary ties (switches the rank function to `RANK`).
    pub fn with_ties(mut self) -> Self {
        self.with_ties = true;
        self
    }
}

/// Immutable query-description value over one dataset
#[derive(Clone)]
pub struct DatasetQuery {
    conn: Arc<ConnectionManager>,
    source: String,
    extensions: Vec<String>,
    filters: Vec<FilterThunk>,
    order_by: Vec<String>,
    projection: Option<Vec<String>>,
    computed: Vec<(String, String)>,
}

impl DatasetQuery {
    /// Builder over a source: a quoted dataset path (`"'x.parquet'"`) or a
    /// table name already known to the engine.
    pub fn new(conn: Arc<ConnectionManager>, source: impl Into<String>) -> Self {
        DatasetQuery {
            conn,
            source: source.into(),
            extensions: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            projection: None,
            computed: Vec::new(),
        }
    }

    pub(crate) fn with_extensions(
        conn: Arc<ConnectionManager>,
        source: impl Into<String>,
        extensions: Vec<String>,
    ) -> Self {
        DatasetQuery {
            extensions,
            ..DatasetQuery::new(conn, source)
        }
    }

    // ---- Filter verbs (each returns a new builder) ----
    // Sugar forms wrap the fragment constructors around a caller closure.

    /// Arbitrary filter thunk. Return [`Fragment::Empty`] to skip.
    pub fn filter<F>(&self, clause: F) -> Self
    where
        F: Fn() -> Fragment + Send + Sync + 'static,
    {
        self.with_filter(Arc::new(clause))
    }

    /// `col = value`. Skipped while the closure yields `None`.
    pub fn eq<V, F>(&self, column: &str, value: F) -> Self
    where
        V: Into<Value>,
        F: Fn() -> Option<V> + Send + Sync + 'static,
    {
        let column = column.to_string();
        self.filter(move || fragment::eq(&column, value()))
    }

    /// `col IN (...)`. Skipped while the closure yields an empty list.
    pub fn is_in<F>(&self, column: &str, values: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        let column = column.to_string();
        self.filter(move || fragment::in_list(&column, &values()))
    }

    /// `col ILIKE '%term%'`. Skipped while the closure yields a blank string.
    pub fn ilike<F>(&self, column: &str, text: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        let column = column.to_string();
        self.filter(move || fragment::ilike(&column, &text()))
    }

    /// `col BETWEEN lo AND hi`. Skipped while the closure yields `None` or
    /// exactly `full_range`.
    pub fn between<F>(&self, column: &str, range: F, full_range: Option<(f64, f64)>) -> Self
    where
        F: Fn() -> Option<(f64, f64)> + Send + Sync + 'static,
    {
        let column = column.to_string();
        self.filter(move || fragment::between(&column, range(), full_range))
    }

    // ---- Ordering and column verbs ----

    /// `ORDER BY` columns; replaces any previous ordering (last call wins).
    /// Use a bare name for ascending, [`fragment::desc`] for descending.
    /// NULLs always sort last.
    pub fn arrange<I>(&self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut next = self.clone();
        next.order_by = columns.into_iter().map(Into::into).collect();
        next
    }

    /// Pick specific columns; replaces any previous projection. A computed
    /// column whose alias matches a projected name is inlined as
    /// `expression AS alias`.
    pub fn select<I>(&self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut next = self.clone();
        next.projection = Some(columns.into_iter().map(Into::into).collect());
        next
    }

    /// Add computed columns as `(alias, expression)` pairs, cumulative across
    /// calls. Without a projection they are appended after `*`.
    pub fn mutate<I, S>(&self, exprs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.computed
            .extend(exprs.into_iter().map(|(alias, expr)| (alias.into(), expr.into())));
        next
    }

    /// Rename columns via `(new_name, old_column)` pairs, keeping all columns.
    ///
    /// This is a terminal transform: it replaces the projection with a single
    /// `* EXCLUDE (...)` expression and does not compose with a later
    /// [`select`](Self::select) or [`mutate`](Self::mutate) in the same chain.
    pub fn rename<I, S>(&self, mapping: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let pairs: Vec<(String, String)> = mapping
            .into_iter()
            .map(|(new_name, old)| (new_name.into(), old.into()))
            .collect();
        let excludes = pairs
            .iter()
            .map(|(_, old)| old.clone())
            .collect::<Vec<_>>()
            .join(", ");
        let aliases = pairs
            .iter()
            .map(|(new_name, old)| format!("{} AS {}", old, new_name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut next = self.clone();
        next.projection = Some(vec![format!("* EXCLUDE ({}), {}", excludes, aliases)]);
        next
    }

    // ---- Materializations ----

    /// Full projection over the filtered, ordered set.
    pub fn rows(&self) -> ReactiveQuery {
        let q = self.clone();
        self.reactive(move || {
            assemble([
                format!("SELECT {} FROM {}", q.select_list(), q.source),
                q.where_clause(&[]),
                q.order_clause(),
            ])
        })
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> ReactiveQuery {
        let q = self.clone();
        self.reactive(move || {
            assemble([
                format!("SELECT {} FROM {}", q.select_list(), q.source),
                q.where_clause(&[]),
                q.order_clause(),
                format!("LIMIT {}", n),
            ])
        })
    }

    /// First six rows.
    pub fn head_default(&self) -> ReactiveQuery {
        self.head(DEFAULT_HEAD)
    }

    /// Per-column statistics over the filtered set via the engine's profiling
    /// statement: min, max, approximate distinct count, mean, stddev,
    /// quartiles, row count, null fraction.
    pub fn describe(&self) -> ReactiveQuery {
        let q = self.clone();
        self.reactive(move || {
            assemble([
                format!("SUMMARIZE SELECT * FROM {}", q.source),
                q.where_clause(&[]),
            ])
        })
    }

    /// Column metadata plus sample values; see [`Glimpse`].
    pub fn glimpse(&self, sample_size: usize) -> Glimpse {
        let schema = {
            let q = self.clone();
            self.reactive(move || format!("DESCRIBE SELECT * FROM {}", q.source))
        };
        let total = {
            let q = self.clone();
            ScalarQuery::new(
                self.reactive(move || {
                    assemble([
                        format!("SELECT COUNT(*) FROM {}", q.source),
                        q.where_clause(&[]),
                    ])
                }),
                Value::Int(0),
            )
        };
        let sample = {
            let q = self.clone();
            self.reactive(move || {
                assemble([
                    format!("SELECT * FROM {}", q.source),
                    q.where_clause(&[]),
                    format!("LIMIT {}", sample_size),
                ])
            })
        };
        Glimpse {
            schema,
            total,
            sample,
        }
    }

    /// Total row count of the filtered set.
    pub fn count(&self) -> ScalarQuery {
        let q = self.clone();
        ScalarQuery::new(
            self.reactive(move || {
                assemble([
                    format!("SELECT COUNT(*) FROM {}", q.source),
                    q.where_clause(&[]),
                ])
            }),
            Value::Int(0),
        )
    }

    /// Grouped counts, most frequent first. The count column is named `n`.
    pub fn count_by(&self, columns: &[&str]) -> ReactiveQuery {
        let group = columns.join(", ");
        let q = self.clone();
        self.reactive(move || {
            assemble([
                format!("SELECT {}, COUNT(*) AS n FROM {}", group, q.source),
                q.where_clause(&[]),
                format!("GROUP BY {} ORDER BY n DESC", group),
            ])
        })
    }

    /// Distinct values of one column: non-null, sorted, as a flat list.
    pub fn distinct(&self, column: &str) -> ColumnQuery {
        let column = column.to_string();
        let q = self.clone();
        ColumnQuery::new(self.reactive(move || {
            assemble([
                format!("SELECT DISTINCT {} FROM {}", column, q.source),
                q.where_clause(&[format!("{} IS NOT NULL", column)]),
                format!("ORDER BY {}", column),
            ])
        }))
    }

    /// Distinct tuples of several columns, non-null in every named column,
    /// sorted by the same columns.
    pub fn distinct_on(&self, columns: &[&str]) -> ReactiveQuery {
        let list = columns.join(", ");
        let not_null: Vec<String> = columns
            .iter()
            .map(|c| format!("{} IS NOT NULL", c))
            .collect();
        let q = self.clone();
        self.reactive(move || {
            assemble([
                format!("SELECT DISTINCT {} FROM {}", list, q.source),
                q.where_clause(&not_null),
                format!("ORDER BY {}", list),
            ])
        })
    }

    /// All distinct rows of the filtered set.
    pub fn distinct_rows(&self) -> ReactiveQuery {
        let q = self.clone();
        self.reactive(move || {
            assemble([
                format!("SELECT DISTINCT * FROM {}", q.source),
                q.where_clause(&[]),
            ])
        })
    }

    /// Smallest non-null value of a column, or `default` when no rows qualify.
    pub fn min(&self, column: &str, default: Value) -> ScalarQuery {
        self.extreme("MIN", column, default)
    }

    /// Largest non-null value of a column, or `default` when no rows qualify.
    pub fn max(&self, column: &str, default: Value) -> ScalarQuery {
        self.extreme("MAX", column, default)
    }

    fn extreme(&self, func: &str, column: &str, default: Value) -> ScalarQuery {
        let func = func.to_string();
        let column = column.to_string();
        let q = self.clone();
        ScalarQuery::new(
            self.reactive(move || {
                assemble([
                    format!("SELECT {}({}) FROM {}", func, column, q.source),
                    q.where_clause(&[format!("{} IS NOT NULL", column)]),
                ])
            }),
            default,
        )
    }

    /// Ungrouped aggregate over the filtered set. `aggs` is an ordered list of
    /// `(alias, expression)` pairs, e.g. `[("n", "COUNT(*)")]`.
    pub fn summarize(&self, aggs: &[(&str, &str)]) -> ReactiveQuery {
        let select = agg_list(aggs);
        let q = self.clone();
        self.reactive(move || {
            assemble([
                format!("SELECT {} FROM {}", select, q.source),
                q.where_clause(&[]),
            ])
        })
    }

    /// Grouped aggregate, ordered by the group keys.
    pub fn summarize_by(&self, aggs: &[(&str, &str)], by: &[&str]) -> ReactiveQuery {
        let select = agg_list(aggs);
        let group = by.join(", ");
        let q = self.clone();
        self.reactive(move || {
            assemble([
                format!("SELECT {}, {} FROM {}", group, select, q.source),
                q.where_clause(&[]),
                format!("GROUP BY {} ORDER BY {}", group, group),
            ])
        })
    }

    /// Top `n` rows by `column`, overall or per group (see [`SliceOpts`]).
    pub fn slice_max(&self, column: &str, n: usize, opts: SliceOpts) -> ReactiveQuery {
        self.slice(column, n, "DESC", opts)
    }

    /// Bottom `n` rows by `column`, overall or per group.
    pub fn slice_min(&self, column: &str, n: usize, opts: SliceOpts) -> ReactiveQuery {
        self.slice(column, n, "ASC", opts)
    }

    fn slice(&self, column: &str, n: usize, direction: &str, opts: SliceOpts) -> ReactiveQuery {
        let column = column.to_string();
        let direction = direction.to_string();
        let q = self.clone();
        if opts.by.is_empty() {
            return self.reactive(move || {
                assemble([
                    format!("SELECT {} FROM {}", q.select_list(), q.source),
                    q.where_clause(&[]),
                    format!("ORDER BY {} {} NULLS LAST LIMIT {}", column, direction, n),
                ])
            });
        }
        let rank_fn = if opts.with_ties { "RANK" } else { "ROW_NUMBER" };
        let partition = opts.by.join(", ");
        let qualify = format!(
            "QUALIFY {}() OVER (PARTITION BY {} ORDER BY {} {} NULLS LAST) <= {}",
            rank_fn, partition, column, direction, n
        );
        self.reactive(move || {
            assemble([
                format!("SELECT {} FROM {}", q.select_list(), q.source),
                q.where_clause(&[]),
                qualify.clone(),
            ])
        })
    }

    /// Escape hatch: the closure receives the builder's current `WHERE` text
    /// (empty when no filter is active) and returns a full statement.
    pub fn sql<F>(&self, build: F) -> ReactiveQuery
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let q = self.clone();
        self.reactive(move || build(&q.where_clause(&[])))
    }

    // ---- Read-only getters for UI state ----

    /// Whether any filter thunk currently produces a constraint.
    pub fn is_filtered(&self) -> bool {
        !self.clauses().is_empty()
    }

    /// The current `WHERE` clause text; empty string when no filter is active.
    pub fn where_sql(&self) -> String {
        self.where_clause(&[])
    }

    // ---- Internal ----

    fn with_filter(&self, filter: FilterThunk) -> Self {
        let mut next = self.clone();
        next.filters.push(filter);
        next
    }

    fn reactive<F>(&self, build_sql: F) -> ReactiveQuery
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        ReactiveQuery::new(Arc::clone(&self.conn), self.extensions.clone(), build_sql)
    }

    fn clauses(&self) -> Vec<String> {
        self.filters
            .iter()
            .filter_map(|thunk| thunk().into_clause())
            .collect()
    }

    fn where_clause(&self, extra: &[String]) -> String {
        let mut all = self.clauses();
        all.extend_from_slice(extra);
        if all.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", all.join(" AND "))
        }
    }

    fn select_list(&self) -> String {
        if let Some(projection) = &self.projection {
            // Inline computed expressions for matching aliases
            return projection
                .iter()
                .map(|col| {
                    match self.computed.iter().find(|(alias, _)| alias == col) {
                        Some((alias, expr)) => format!("{} AS {}", expr, alias),
                        None => col.clone(),
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
        }
        if self.computed.is_empty() {
            return "*".to_string();
        }
        let computed = self
            .computed
            .iter()
            .map(|(alias, expr)| format!("{} AS {}", expr, alias))
            .collect::<Vec<_>>()
            .join(", ");
        format!("*, {}", computed)
    }

    fn order_clause(&self) -> String {
        if self.order_by.is_empty() {
            return String::new();
        }
        let columns = self
            .order_by
            .iter()
            .map(|col| format!("{} NULLS LAST", col))
            .collect::<Vec<_>>()
            .join(", ");
        format!("ORDER BY {}", columns)
    }
}

fn agg_list(aggs: &[(&str, &str)]) -> String {
    aggs.iter()
        .map(|(alias, expr)| format!("{} AS {}", expr, alias))
        .collect::<Vec<_>>()
        .join(", ")
}

fn assemble<I: IntoIterator<Item = String>>(parts: I) -> String {
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Column metadata plus sample values, tibble-glimpse style
pub struct Glimpse {
    schema: ReactiveQuery,
    total: ScalarQuery,
    sample: ReactiveQuery,
}

/// One column as seen by [`Glimpse::columns`]
#[derive(Debug, Clone, PartialEq)]
pub struct GlimpseColumn {
    pub name: String,
    pub type_name: String,
    pub sample: Vec<Value>,
}

impl Glimpse {
    /// Run all three sub-queries (schema, filtered count, bounded sample).
    pub async fn refresh(&self) {
        tokio::join!(self.schema.refresh(), self.total.refresh(), self.sample.refresh());
    }

    /// Re-run on every change of the trigger channel.
    pub fn attach<T: Clone + Send + Sync + 'static>(
        &self,
        trigger: watch::Receiver<T>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.schema.attach(trigger.clone()),
            self.total.attach(trigger.clone()),
            self.sample.attach(trigger),
        ]
    }

    /// Per-column name, declared type, and sample values.
    pub fn columns(&self) -> Vec<GlimpseColumn> {
        let sample_rows = self.sample.rows();
        self.schema
            .rows()
            .iter()
            .map(|col| {
                let name = col
                    .get("column_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let type_name = col
                    .get("column_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let sample = sample_rows
                    .iter()
                    .map(|row| row.get(&name).cloned().unwrap_or(Value::Null))
                    .collect();
                GlimpseColumn {
                    name,
                    type_name,
                    sample,
                }
            })
            .collect()
    }

    /// Total filtered row count.
    pub fn n_rows(&self) -> i64 {
        self.total.value().as_i64().unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.schema.rows().len()
    }

    /// True while any sub-query is loading.
    pub fn loading(&self) -> bool {
        self.schema.loading() || self.total.loading() || self.sample.loading()
    }

    /// First error among the sub-queries, if any.
    pub fn error(&self) -> Option<String> {
        self.schema
            .error()
            .or_else(|| self.total.error())
            .or_else(|| self.sample.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{desc, ilike, or};
    use crate::testing::{row, MockEngine};

    fn builder(engine: &Arc<MockEngine>) -> DatasetQuery {
        DatasetQuery::new(engine.manager(), "'papers.parquet'")
    }

    async fn generated_sql(engine: &Arc<MockEngine>, query: &ReactiveQuery) -> String {
        query.refresh().await;
        engine
            .queries()
            .into_iter()
            .rfind(|sql| !sql.starts_with("INSTALL") && !sql.starts_with("LOAD"))
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_rows_without_filters_has_no_where() {
        let engine = MockEngine::new();
        let q = builder(&engine).rows();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT * FROM 'papers.parquet'"
        );
    }

    #[tokio::test]
    async fn test_inactive_filters_drop_out_entirely() {
        let engine = MockEngine::new();
        let q = builder(&engine)
            .ilike("title", String::new)
            .is_in("college", Vec::new)
            .eq::<i64, _>("year", || None)
            .between("score", || None, None)
            .rows();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT * FROM 'papers.parquet'"
        );
    }

    #[tokio::test]
    async fn test_filters_join_with_and() {
        let engine = MockEngine::new();
        let q = builder(&engine)
            .eq("year", || Some(2024))
            .ilike("title", || "graph".to_string())
            .rows();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT * FROM 'papers.parquet' WHERE year = 2024 AND title ILIKE '%graph%'"
        );
    }

    #[tokio::test]
    async fn test_filter_thunks_see_current_state() {
        let engine = MockEngine::new();
        let year = Arc::new(parking_lot::Mutex::new(Some(2020_i64)));
        let slot = year.clone();
        let base = builder(&engine).eq("year", move || *slot.lock());
        let q = base.rows();

        q.refresh().await;
        *year.lock() = None;
        q.refresh().await;

        let queries = engine.queries();
        assert!(queries[0].contains("WHERE year = 2020"));
        assert!(!queries[1].contains("WHERE"));
    }

    #[test]
    fn test_builder_immutability() {
        let engine = MockEngine::new();
        let base = builder(&engine).eq("year", || Some(2024));
        let before = base.where_sql();

        let _derived = base
            .ilike("title", || "x".to_string())
            .arrange(["year"])
            .select(["title"])
            .mutate([("decade", "year / 10")]);

        assert_eq!(base.where_sql(), before);
        assert_eq!(base.where_sql(), "WHERE year = 2024");
    }

    #[test]
    fn test_is_filtered_tracks_active_clauses() {
        let engine = MockEngine::new();
        let base = builder(&engine);
        assert!(!base.is_filtered());
        assert!(!base.ilike("title", String::new).is_filtered());
        assert!(base.eq("year", || Some(1999)).is_filtered());
    }

    #[tokio::test]
    async fn test_arrange_last_call_wins_and_nulls_last() {
        let engine = MockEngine::new();
        let q = builder(&engine)
            .arrange(["title"])
            .arrange(vec!["year".to_string(), desc("score")])
            .rows();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT * FROM 'papers.parquet' ORDER BY year NULLS LAST, score DESC NULLS LAST"
        );
    }

    #[tokio::test]
    async fn test_select_inlines_matching_computed_columns() {
        let engine = MockEngine::new();
        let q = builder(&engine)
            .mutate([("decade", "year / 10 * 10")])
            .select(["title", "decade"])
            .rows();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT title, year / 10 * 10 AS decade FROM 'papers.parquet'"
        );
    }

    #[tokio::test]
    async fn test_mutate_appends_after_star() {
        let engine = MockEngine::new();
        let q = builder(&engine)
            .mutate([("decade", "year / 10 * 10")])
            .mutate([("short", "substr(title, 1, 20)")])
            .rows();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT *, year / 10 * 10 AS decade, substr(title, 1, 20) AS short \
             FROM 'papers.parquet'"
        );
    }

    #[tokio::test]
    async fn test_rename_builds_exclude_projection() {
        let engine = MockEngine::new();
        let q = builder(&engine)
            .rename([("author", "ego_display_name"), ("unit", "college")])
            .rows();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT * EXCLUDE (ego_display_name, college), \
             ego_display_name AS author, college AS unit FROM 'papers.parquet'"
        );
    }

    #[tokio::test]
    async fn test_head_limits() {
        let engine = MockEngine::new();
        let q = builder(&engine).head_default();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT * FROM 'papers.parquet' LIMIT 6"
        );
    }

    #[tokio::test]
    async fn test_describe_uses_profiling_statement() {
        let engine = MockEngine::new();
        let q = builder(&engine).eq("year", || Some(2024)).describe();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SUMMARIZE SELECT * FROM 'papers.parquet' WHERE year = 2024"
        );
    }

    #[tokio::test]
    async fn test_count_scalar() {
        let engine = MockEngine::new();
        engine.respond("COUNT(*)", vec![row(&[("count_star()", Value::HugeInt(41))])]);
        let counter = builder(&engine).count();
        counter.refresh().await;
        assert_eq!(counter.value(), Value::Int(41));
    }

    #[tokio::test]
    async fn test_count_by_orders_by_frequency() {
        let engine = MockEngine::new();
        let q = builder(&engine).count_by(&["college", "dept"]);
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT college, dept, COUNT(*) AS n FROM 'papers.parquet' \
             GROUP BY college, dept ORDER BY n DESC"
        );
    }

    #[tokio::test]
    async fn test_distinct_single_column_filters_nulls_and_sorts() {
        let engine = MockEngine::new();
        engine.respond(
            "DISTINCT college",
            vec![
                row(&[("college", Value::Text("Arts".to_string()))]),
                row(&[("college", Value::Text("Eng".to_string()))]),
            ],
        );
        let distinct = builder(&engine).distinct("college");
        distinct.refresh().await;

        assert_eq!(
            engine.queries().pop().unwrap_or_default(),
            "SELECT DISTINCT college FROM 'papers.parquet' \
             WHERE college IS NOT NULL ORDER BY college"
        );
        assert_eq!(
            distinct.items(),
            vec![
                Value::Text("Arts".to_string()),
                Value::Text("Eng".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_distinct_on_tuples() {
        let engine = MockEngine::new();
        let q = builder(&engine).distinct_on(&["college", "dept"]);
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT DISTINCT college, dept FROM 'papers.parquet' \
             WHERE college IS NOT NULL AND dept IS NOT NULL ORDER BY college, dept"
        );
    }

    #[tokio::test]
    async fn test_distinct_rows() {
        let engine = MockEngine::new();
        let q = builder(&engine).distinct_rows();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT DISTINCT * FROM 'papers.parquet'"
        );
    }

    #[tokio::test]
    async fn test_min_with_default() {
        let engine = MockEngine::new();
        let min = builder(&engine).min("year", Value::Int(1900));
        min.refresh().await;
        assert_eq!(
            engine.queries().pop().unwrap_or_default(),
            "SELECT MIN(year) FROM 'papers.parquet' WHERE year IS NOT NULL"
        );
        // Empty result set falls back to the default
        assert_eq!(min.value(), Value::Int(1900));
    }

    #[tokio::test]
    async fn test_summarize_ungrouped_and_grouped() {
        let engine = MockEngine::new();
        let base = builder(&engine);

        let q = base.summarize(&[("n", "COUNT(*)"), ("avg_cites", "AVG(cites)")]);
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT COUNT(*) AS n, AVG(cites) AS avg_cites FROM 'papers.parquet'"
        );

        let grouped = base.summarize_by(&[("n", "COUNT(*)")], &["college"]);
        assert_eq!(
            generated_sql(&engine, &grouped).await,
            "SELECT college, COUNT(*) AS n FROM 'papers.parquet' \
             GROUP BY college ORDER BY college"
        );
    }

    #[tokio::test]
    async fn test_slice_max_ungrouped_uses_limit() {
        let engine = MockEngine::new();
        let q = builder(&engine).slice_max("score", 3, SliceOpts::default());
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT * FROM 'papers.parquet' ORDER BY score DESC NULLS LAST LIMIT 3"
        );
    }

    #[tokio::test]
    async fn test_slice_max_grouped_with_ties_uses_rank() {
        let engine = MockEngine::new();
        let q = builder(&engine).slice_max("score", 1, SliceOpts::by(["team"]).with_ties());
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT * FROM 'papers.parquet' \
             QUALIFY RANK() OVER (PARTITION BY team ORDER BY score DESC NULLS LAST) <= 1"
        );
    }

    #[tokio::test]
    async fn test_slice_min_grouped_without_ties_uses_row_number() {
        let engine = MockEngine::new();
        let q = builder(&engine).slice_min("score", 2, SliceOpts::by(["team", "season"]));
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT * FROM 'papers.parquet' QUALIFY ROW_NUMBER() OVER \
             (PARTITION BY team, season ORDER BY score ASC NULLS LAST) <= 2"
        );
    }

    #[tokio::test]
    async fn test_sql_escape_hatch_receives_where_text() {
        let engine = MockEngine::new();
        let q = builder(&engine)
            .eq("year", || Some(2024))
            .sql(|where_sql| format!("SELECT year, COUNT(*) FROM 'papers.parquet' {}", where_sql));
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT year, COUNT(*) FROM 'papers.parquet' WHERE year = 2024"
        );
    }

    #[tokio::test]
    async fn test_or_fragments_in_filter() {
        let engine = MockEngine::new();
        let q = builder(&engine)
            .filter(|| or([ilike("title", "net"), ilike("author", "net")]))
            .rows();
        assert_eq!(
            generated_sql(&engine, &q).await,
            "SELECT * FROM 'papers.parquet' \
             WHERE (title ILIKE '%net%' OR author ILIKE '%net%')"
        );
    }

    #[tokio::test]
    async fn test_glimpse_combines_three_subqueries() {
        let engine = MockEngine::new();
        engine.respond(
            "DESCRIBE",
            vec![
                row(&[
                    ("column_name", Value::Text("title".to_string())),
                    ("column_type", Value::Text("VARCHAR".to_string())),
                ]),
                row(&[
                    ("column_name", Value::Text("year".to_string())),
                    ("column_type", Value::Text("BIGINT".to_string())),
                ]),
            ],
        );
        engine.respond("COUNT(*)", vec![row(&[("count_star()", Value::HugeInt(2))])]);
        engine.respond(
            "LIMIT 5",
            vec![
                row(&[
                    ("title", Value::Text("A".to_string())),
                    ("year", Value::Int(2001)),
                ]),
                row(&[
                    ("title", Value::Text("B".to_string())),
                    ("year", Value::Int(2002)),
                ]),
            ],
        );

        let glimpse = builder(&engine).glimpse(5);
        assert!(glimpse.loading());
        glimpse.refresh().await;

        assert!(!glimpse.loading());
        assert_eq!(glimpse.error(), None);
        assert_eq!(glimpse.n_rows(), 2);
        assert_eq!(glimpse.n_cols(), 2);

        let columns = glimpse.columns();
        assert_eq!(columns[0].name, "title");
        assert_eq!(columns[0].type_name, "VARCHAR");
        assert_eq!(
            columns[0].sample,
            vec![Value::Text("A".to_string()), Value::Text("B".to_string())]
        );
        assert_eq!(columns[1].sample, vec![Value::Int(2001), Value::Int(2002)]);
    }

    #[tokio::test]
    async fn test_glimpse_error_is_or_of_subqueries() {
        let engine = MockEngine::new();
        engine.fail("COUNT(*)", "out of memory");
        let glimpse = builder(&engine).glimpse(5);
        glimpse.refresh().await;
        let message = glimpse.error().unwrap_or_default();
        assert!(message.contains("out of memory"), "got: {message}");
    }
}
