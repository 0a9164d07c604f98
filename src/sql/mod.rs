//! # SQL statement construction for the MySQL driver.
//!
//! A pure function library producing parameterized SQL strings and their
//! bound arguments for change-data-capture:
//!
//! - ranged insert into a shadow (ghost) table;
//! - ranged select with a chunk limit;
//! - discovery of the next unique-key range endpoint;
//! - per-row DML replay (insert/update/delete) keyed on every table column.
//!
//! All identifiers are escaped by backtick-wrapping after one round of
//! quote-unwrapping. Range predicates over composite keys expand into the
//! lexicographic disjunction form, and the returned argument vectors match
//! the placeholder order of the emitted SQL exactly.
//!
//! Nothing here talks to a database; callers bind the returned
//! [`SqlArg`](crate::sql::SqlArg) vectors themselves.

mod builder;
mod columns;

pub use builder::{
    build_dml_delete_query, build_dml_insert_query, build_dml_update_query,
    build_equals_comparison, build_equals_prepared_comparison, build_range_comparison,
    build_range_insert_prepared_query, build_range_insert_query, build_range_prepared_comparison,
    build_range_select_prepared_query, build_range_select_query, build_set_prepared_clause,
    build_unique_key_max_values_prepared_query, build_unique_key_min_values_prepared_query,
    build_unique_key_range_end_prepared_query, build_value_comparison, escape_name,
    ComparisonSign,
};
pub use columns::{Column, ColumnKind, ColumnList, SqlArg, TimezoneConversion};

use thiserror::Error;

/// Errors produced while assembling a query.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryBuildError {
    /// A required column or value list was empty.
    #[error("got 0 {what} in {builder}")]
    Empty {
        what: &'static str,
        builder: &'static str,
    },

    /// Parallel lists disagree on length.
    #[error("got {columns} columns but {values} {what} in {builder}")]
    LengthMismatch {
        columns: usize,
        values: usize,
        what: &'static str,
        builder: &'static str,
    },

    /// The shared column set is not contained in the table columns.
    #[error("shared columns are not a subset of table columns in {builder}")]
    NotASubset { builder: &'static str },
}
