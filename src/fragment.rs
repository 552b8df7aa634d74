//! Composable SQL fragment helpers
//!
//! Pure functions that turn current filter inputs into SQL boolean expressions.
//! Every constructor returns [`Fragment::Empty`] ("no constraint") when its
//! input is blank, empty, or out of play, so that inactive UI controls drop out
//! of the generated `WHERE` clause entirely.
//!
//! All user-controlled values are escaped by doubling single quotes. This is
//! the only injection defense in the layer and is applied uniformly by every
//! value-accepting constructor.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A SQL boolean expression, or an explicit "no constraint" marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragment {
    /// A valid SQL boolean expression
    Clause(String),
    /// No constraint: the filter is inactive and emits nothing
    Empty,
}

impl Fragment {
    /// Borrow the clause text, if any
    pub fn clause(&self) -> Option<&str> {
        match self {
            Fragment::Clause(sql) => Some(sql),
            Fragment::Empty => None,
        }
    }

    /// Take the clause text, if any
    pub fn into_clause(self) -> Option<String> {
        match self {
            Fragment::Clause(sql) => Some(sql),
            Fragment::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Fragment::Empty)
    }
}

/// Double single quotes so a value can sit inside a quoted SQL literal.
fn escape(text: &str) -> String {
    text.replace('\'', "''")
}

/// `col ILIKE '%term%'` — case-insensitive substring match.
/// Empty or whitespace-only input means no constraint.
pub fn ilike(column: &str, text: &str) -> Fragment {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Fragment::Empty;
    }
    Fragment::Clause(format!("{} ILIKE '%{}%'", column, escape(trimmed)))
}

/// `col BETWEEN lo AND hi`, collapsing to `col = lo` when the bounds meet.
///
/// `None` means no constraint, as does a range exactly equal to `full_range`
/// (the control is at its widest setting and would match everything, so the
/// clause is omitted for query-plan clarity).
pub fn between(column: &str, range: Option<(f64, f64)>, full_range: Option<(f64, f64)>) -> Fragment {
    let Some((lo, hi)) = range else {
        return Fragment::Empty;
    };
    if let Some((full_lo, full_hi)) = full_range {
        if lo == full_lo && hi == full_hi {
            return Fragment::Empty;
        }
    }
    if lo == hi {
        Fragment::Clause(format!("{} = {}", column, lo))
    } else {
        Fragment::Clause(format!("{} BETWEEN {} AND {}", column, lo, hi))
    }
}

/// `col IN ('a', 'b', ...)`. An empty list means no constraint.
pub fn in_list<S: AsRef<str>>(column: &str, values: &[S]) -> Fragment {
    if values.is_empty() {
        return Fragment::Empty;
    }
    let list = values
        .iter()
        .map(|v| format!("'{}'", escape(v.as_ref())))
        .collect::<Vec<_>>()
        .join(", ");
    Fragment::Clause(format!("{} IN ({})", column, list))
}

/// `col = value`. `None` means no constraint. Text values are quoted and
/// escaped; numeric and boolean values are emitted as bare literals.
pub fn eq<V: Into<Value>>(column: &str, value: Option<V>) -> Fragment {
    let Some(value) = value.map(Into::into) else {
        return Fragment::Empty;
    };
    match value {
        Value::Null => Fragment::Empty,
        Value::Text(s) => Fragment::Clause(format!("{} = '{}'", column, escape(&s))),
        other => Fragment::Clause(format!("{} = {}", column, other)),
    }
}

/// Combine fragments with `OR`. Empty inputs are dropped; zero survivors
/// means no constraint, a single survivor is returned unwrapped, two or more
/// are parenthesized.
pub fn or<I: IntoIterator<Item = Fragment>>(fragments: I) -> Fragment {
    join(fragments, " OR ")
}

/// Combine fragments with `AND`. Same survivor rules as [`or`].
pub fn and<I: IntoIterator<Item = Fragment>>(fragments: I) -> Fragment {
    join(fragments, " AND ")
}

fn join<I: IntoIterator<Item = Fragment>>(fragments: I, separator: &str) -> Fragment {
    let mut valid: Vec<String> = fragments
        .into_iter()
        .filter_map(Fragment::into_clause)
        .collect();
    match valid.len() {
        0 => Fragment::Empty,
        1 => Fragment::Clause(valid.swap_remove(0)),
        _ => Fragment::Clause(format!("({})", valid.join(separator))),
    }
}

/// Mark a column for descending order in `arrange()`. Ascending is the
/// unmarked default.
pub fn desc(column: &str) -> String {
    format!("{} DESC", column)
}
