//! Parameterized statement builders for chunked range scans and DML replay.
//!
//! Every builder returns the SQL text together with the argument vector in
//! placeholder order. Range predicates over an n-column unique key expand
//! into the lexicographic disjunction:
//!
//! ```text
//! (c1 op v1) or ((c1 = v1) AND (c2 op v2)) or ... [or (c1 = v1 and ... and cn = vn)]
//! ```
//!
//! with the trailing equality only for the inclusive forms.

use crate::sql::{
    columns::{ColumnKind, ColumnList, SqlArg},
    QueryBuildError,
};

/// Comparison operator of a value or range predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonSign {
    LessThan,
    LessThanOrEquals,
    Equals,
    GreaterThanOrEquals,
    GreaterThan,
    NotEquals,
}

impl ComparisonSign {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonSign::LessThan => "<",
            ComparisonSign::LessThanOrEquals => "<=",
            ComparisonSign::Equals => "=",
            ComparisonSign::GreaterThanOrEquals => ">=",
            ComparisonSign::GreaterThan => ">",
            ComparisonSign::NotEquals => "!=",
        }
    }
}

impl std::fmt::Display for ComparisonSign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escapes a database/table/column/index name by wrapping it in backticks,
/// after attempting one round of quote-unwrapping. This keeps identifiers
/// safe on disk and in statements; it is not an injection barrier.
pub fn escape_name(name: &str) -> String {
    format!("`{}`", unquote(name))
}

fn unquote(name: &str) -> &str {
    let bytes = name.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && matches!(first, b'"' | b'\'' | b'`') {
            return &name[1..name.len() - 1];
        }
    }
    name
}

fn escape_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|n| escape_name(n.as_ref())).collect()
}

/// Placeholder tokens for `columns`, binding time-typed columns through
/// `convert_tz` so session-timezone values land as UTC.
fn build_columns_prepared_values(columns: &ColumnList) -> Vec<String> {
    columns
        .columns()
        .iter()
        .map(|column| match &column.timezone_conversion {
            Some(tz) => format!("convert_tz(?, '{}', '+00:00')", tz.to_timezone),
            None => "?".to_string(),
        })
        .collect()
}

fn build_prepared_values(length: usize) -> Vec<String> {
    vec!["?".to_string(); length]
}

/// Ascending and descending order tokens for a unique key, routing enum
/// columns through `concat` so MySQL orders them lexically.
fn unique_key_order_tokens(columns: &ColumnList) -> (Vec<String>, Vec<String>) {
    let mut ascending = Vec::with_capacity(columns.len());
    let mut descending = Vec::with_capacity(columns.len());
    for column in columns.columns() {
        let name = escape_name(&column.name);
        if column.kind == ColumnKind::Enum {
            ascending.push(format!("concat({name}) asc"));
            descending.push(format!("concat({name}) desc"));
        } else {
            ascending.push(format!("{name} asc"));
            descending.push(format!("{name} desc"));
        }
    }
    (ascending, descending)
}

/// `(column sign value)` with the column escaped.
pub fn build_value_comparison(
    column: &str,
    value: &str,
    sign: ComparisonSign,
) -> Result<String, QueryBuildError> {
    if column.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "column",
            builder: "build_value_comparison",
        });
    }
    if value.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "value",
            builder: "build_value_comparison",
        });
    }
    Ok(format!("({} {} {})", escape_name(column), sign, value))
}

/// Conjunction of per-column equality comparisons, wrapped in parentheses.
pub fn build_equals_comparison(
    columns: &[String],
    values: &[String],
) -> Result<String, QueryBuildError> {
    if columns.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "columns",
            builder: "build_equals_comparison",
        });
    }
    if columns.len() != values.len() {
        return Err(QueryBuildError::LengthMismatch {
            columns: columns.len(),
            values: values.len(),
            what: "values",
            builder: "build_equals_comparison",
        });
    }

    let comparisons = columns
        .iter()
        .zip(values)
        .map(|(column, value)| build_value_comparison(column, value, ComparisonSign::Equals))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", comparisons.join(" and ")))
}

/// Equality conjunction with `?` placeholders for every column.
pub fn build_equals_prepared_comparison(columns: &[String]) -> Result<String, QueryBuildError> {
    let values = build_prepared_values(columns.len());
    build_equals_comparison(columns, &values)
}

/// `SET` clause assigning a placeholder to every column, with timezone
/// conversion where the column carries it.
pub fn build_set_prepared_clause(columns: &ColumnList) -> Result<String, QueryBuildError> {
    if columns.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "columns",
            builder: "build_set_prepared_clause",
        });
    }

    let tokens: Vec<String> = columns
        .columns()
        .iter()
        .map(|column| match &column.timezone_conversion {
            Some(tz) => format!(
                "{}=convert_tz(?, '{}', '+00:00')",
                escape_name(&column.name),
                tz.to_timezone
            ),
            None => format!("{}=?", escape_name(&column.name)),
        })
        .collect();
    Ok(tokens.join(", "))
}

/// Lexicographic range predicate over a composite key.
///
/// The inclusive signs are rewritten to their strict counterparts plus a
/// trailing full-equality disjunct. The returned argument vector follows
/// the placeholder order of the emitted fragments exactly.
pub fn build_range_comparison(
    columns: &[String],
    values: &[String],
    args: &[SqlArg],
    sign: ComparisonSign,
) -> Result<(String, Vec<SqlArg>), QueryBuildError> {
    if columns.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "columns",
            builder: "build_range_comparison",
        });
    }
    if columns.len() != values.len() {
        return Err(QueryBuildError::LengthMismatch {
            columns: columns.len(),
            values: values.len(),
            what: "values",
            builder: "build_range_comparison",
        });
    }
    if columns.len() != args.len() {
        return Err(QueryBuildError::LengthMismatch {
            columns: columns.len(),
            values: args.len(),
            what: "args",
            builder: "build_range_comparison",
        });
    }

    let (sign, include_equals) = match sign {
        ComparisonSign::LessThanOrEquals => (ComparisonSign::LessThan, true),
        ComparisonSign::GreaterThanOrEquals => (ComparisonSign::GreaterThan, true),
        other => (other, false),
    };

    let mut comparisons = Vec::with_capacity(columns.len() + 1);
    let mut exploded_args = Vec::new();

    for i in 0..columns.len() {
        let range_comparison = build_value_comparison(&columns[i], &values[i], sign)?;
        if i > 0 {
            let equalities = build_equals_comparison(&columns[..i], &values[..i])?;
            comparisons.push(format!("({equalities} AND {range_comparison})"));
            exploded_args.extend_from_slice(&args[..i]);
            exploded_args.push(args[i].clone());
        } else {
            comparisons.push(range_comparison);
            exploded_args.push(args[i].clone());
        }
    }

    if include_equals {
        comparisons.push(build_equals_comparison(columns, values)?);
        exploded_args.extend_from_slice(args);
    }

    Ok((format!("({})", comparisons.join(" or ")), exploded_args))
}

/// Range predicate with placeholder values (timezone-aware).
pub fn build_range_prepared_comparison(
    columns: &ColumnList,
    args: &[SqlArg],
    sign: ComparisonSign,
) -> Result<(String, Vec<SqlArg>), QueryBuildError> {
    let values = build_columns_prepared_values(columns);
    build_range_comparison(&columns.names(), &values, args, sign)
}

/// Ranged copy of one chunk from the original table into the ghost table.
#[allow(clippy::too_many_arguments)]
pub fn build_range_insert_query(
    database: &str,
    original_table: &str,
    ghost_table: &str,
    shared_columns: &[String],
    mapped_shared_columns: &[String],
    unique_key: &str,
    unique_key_columns: &ColumnList,
    range_start_values: &[String],
    range_end_values: &[String],
    range_start_args: &[SqlArg],
    range_end_args: &[SqlArg],
    include_range_start: bool,
    transactional: bool,
) -> Result<(String, Vec<SqlArg>), QueryBuildError> {
    if shared_columns.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "shared columns",
            builder: "build_range_insert_query",
        });
    }

    let database = escape_name(database);
    let original_table = escape_name(original_table);
    let ghost_table = escape_name(ghost_table);
    let unique_key = escape_name(unique_key);

    let mapped_listing = escape_names(mapped_shared_columns).join(", ");
    let shared_listing = escape_names(shared_columns).join(", ");

    let min_sign = if include_range_start {
        ComparisonSign::GreaterThanOrEquals
    } else {
        ComparisonSign::GreaterThan
    };

    let mut exploded_args = Vec::new();
    let (range_start_comparison, args) = build_range_comparison(
        &unique_key_columns.names(),
        range_start_values,
        range_start_args,
        min_sign,
    )?;
    exploded_args.extend(args);
    let (range_end_comparison, args) = build_range_comparison(
        &unique_key_columns.names(),
        range_end_values,
        range_end_args,
        ComparisonSign::LessThanOrEquals,
    )?;
    exploded_args.extend(args);

    let transactional_clause = if transactional {
        "lock in share mode"
    } else {
        ""
    };

    let result = format!(
        "\n      insert ignore into {database}.{ghost_table} ({mapped_listing})\n      \
         (select {shared_listing} from {database}.{original_table} force index ({unique_key})\n        \
         where ({range_start_comparison} and {range_end_comparison}) {transactional_clause}\n      )\n    "
    );
    Ok((result, exploded_args))
}

/// [`build_range_insert_query`] with placeholder range bounds.
#[allow(clippy::too_many_arguments)]
pub fn build_range_insert_prepared_query(
    database: &str,
    original_table: &str,
    ghost_table: &str,
    shared_columns: &[String],
    mapped_shared_columns: &[String],
    unique_key: &str,
    unique_key_columns: &ColumnList,
    range_start_args: &[SqlArg],
    range_end_args: &[SqlArg],
    include_range_start: bool,
    transactional: bool,
) -> Result<(String, Vec<SqlArg>), QueryBuildError> {
    let range_start_values = build_columns_prepared_values(unique_key_columns);
    let range_end_values = build_columns_prepared_values(unique_key_columns);
    build_range_insert_query(
        database,
        original_table,
        ghost_table,
        shared_columns,
        mapped_shared_columns,
        unique_key,
        unique_key_columns,
        &range_start_values,
        &range_end_values,
        range_start_args,
        range_end_args,
        include_range_start,
        transactional,
    )
}

/// One chunk of rows from the original table, ascending by the unique key.
///
/// Only the upper bound is applied; the lower bound is intentionally
/// elided, the iterator's position makes it redundant.
#[allow(clippy::too_many_arguments)]
pub fn build_range_select_query(
    database: &str,
    original_table: &str,
    shared_columns: &[String],
    unique_key: &str,
    unique_key_columns: &ColumnList,
    range_end_values: &[String],
    range_end_args: &[SqlArg],
    chunk_size: i64,
) -> Result<(String, Vec<SqlArg>), QueryBuildError> {
    if shared_columns.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "shared columns",
            builder: "build_range_select_query",
        });
    }

    let database = escape_name(database);
    let original_table = escape_name(original_table);
    let unique_key = escape_name(unique_key);
    let shared_listing = escape_names(shared_columns).join(", ");

    let (range_end_comparison, exploded_args) = build_range_comparison(
        &unique_key_columns.names(),
        range_end_values,
        range_end_args,
        ComparisonSign::LessThanOrEquals,
    )?;

    let (ascending, _) = unique_key_order_tokens(unique_key_columns);

    let result = format!(
        "\n\tselect {shared_listing}\n\t\tfrom\n\t\t\t{database}.{original_table}\n\t\t\
         force index ({unique_key})\n\t\twhere ({range_end_comparison})\n\t\torder by\n\t\t\t{}\n\t\tlimit {chunk_size}\n    ",
        ascending.join(", ")
    );
    Ok((result, exploded_args))
}

/// [`build_range_select_query`] with placeholder range bounds.
#[allow(clippy::too_many_arguments)]
pub fn build_range_select_prepared_query(
    database: &str,
    original_table: &str,
    shared_columns: &[String],
    unique_key: &str,
    unique_key_columns: &ColumnList,
    range_end_args: &[SqlArg],
    chunk_size: i64,
) -> Result<(String, Vec<SqlArg>), QueryBuildError> {
    let range_end_values = build_columns_prepared_values(unique_key_columns);
    build_range_select_query(
        database,
        original_table,
        shared_columns,
        unique_key,
        unique_key_columns,
        &range_end_values,
        range_end_args,
        chunk_size,
    )
}

/// Inclusive maximum of the next chunk: an ascending-limited inner select
/// nested inside a descending limit-1 outer select.
#[allow(clippy::too_many_arguments)]
pub fn build_unique_key_range_end_prepared_query(
    database: &str,
    table: &str,
    unique_key_columns: &ColumnList,
    range_start_args: &[SqlArg],
    range_end_args: &[SqlArg],
    chunk_size: i64,
    include_range_start: bool,
) -> Result<(String, Vec<SqlArg>), QueryBuildError> {
    if unique_key_columns.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "columns",
            builder: "build_unique_key_range_end_prepared_query",
        });
    }

    let database = escape_name(database);
    let table = escape_name(table);

    let start_sign = if include_range_start {
        ComparisonSign::GreaterThanOrEquals
    } else {
        ComparisonSign::GreaterThan
    };

    let mut exploded_args = Vec::new();
    let (range_start_comparison, args) =
        build_range_prepared_comparison(unique_key_columns, range_start_args, start_sign)?;
    exploded_args.extend(args);
    let (range_end_comparison, args) = build_range_prepared_comparison(
        unique_key_columns,
        range_end_args,
        ComparisonSign::LessThanOrEquals,
    )?;
    exploded_args.extend(args);

    let names_listing = escape_names(&unique_key_columns.names()).join(", ");
    let (ascending, descending) = unique_key_order_tokens(unique_key_columns);

    let result = format!(
        "\n      select {names_listing}\n\t\t\t\tfrom (\n\t\t\t\t\tselect\n\t\t\t\t\t\t\t{names_listing}\n\t\t\t\t\t\t\
         from\n\t\t\t\t\t\t\t{database}.{table}\n\t\t\t\t\t\twhere {range_start_comparison} and {range_end_comparison}\n\t\t\t\t\t\t\
         order by\n\t\t\t\t\t\t\t{}\n\t\t\t\t\t\tlimit {chunk_size}\n\t\t\t\t) select_osc_chunk\n\t\t\torder by\n\t\t\t\t{}\n\t\t\tlimit 1\n    ",
        ascending.join(", "),
        descending.join(", ")
    );
    Ok((result, exploded_args))
}

/// Smallest unique key value of the table.
pub fn build_unique_key_min_values_prepared_query(
    database: &str,
    table: &str,
    unique_key_columns: &ColumnList,
) -> Result<String, QueryBuildError> {
    build_unique_key_min_max_values_prepared_query(database, table, unique_key_columns, "asc")
}

/// Largest unique key value of the table.
pub fn build_unique_key_max_values_prepared_query(
    database: &str,
    table: &str,
    unique_key_columns: &ColumnList,
) -> Result<String, QueryBuildError> {
    build_unique_key_min_max_values_prepared_query(database, table, unique_key_columns, "desc")
}

fn build_unique_key_min_max_values_prepared_query(
    database: &str,
    table: &str,
    unique_key_columns: &ColumnList,
    order: &str,
) -> Result<String, QueryBuildError> {
    if unique_key_columns.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "columns",
            builder: "build_unique_key_min_max_values_prepared_query",
        });
    }

    let database = escape_name(database);
    let table = escape_name(table);
    let names_listing = escape_names(&unique_key_columns.names()).join(", ");

    let order_tokens: Vec<String> = unique_key_columns
        .columns()
        .iter()
        .map(|column| {
            let name = escape_name(&column.name);
            if column.kind == ColumnKind::Enum {
                format!("concat({name}) {order}")
            } else {
                format!("{name} {order}")
            }
        })
        .collect();

    Ok(format!(
        "\n      select {names_listing}\n\t\t\t\tfrom\n\t\t\t\t\t{database}.{table}\n\t\t\t\t\
         order by\n\t\t\t\t\t{}\n\t\t\t\tlimit 1\n    ",
        order_tokens.join(", ")
    ))
}

/// Row delete keyed on equality over every table column.
pub fn build_dml_delete_query(
    database: &str,
    table: &str,
    table_columns: &ColumnList,
    args: &[SqlArg],
) -> Result<(String, Vec<SqlArg>), QueryBuildError> {
    if args.len() != table_columns.len() {
        return Err(QueryBuildError::LengthMismatch {
            columns: table_columns.len(),
            values: args.len(),
            what: "args",
            builder: "build_dml_delete_query",
        });
    }

    let unique_key_args: Vec<SqlArg> = table_columns
        .columns()
        .iter()
        .map(|column| {
            let ordinal = table_columns
                .ordinal(&column.name)
                .expect("column belongs to its own list");
            column.convert_arg(args[ordinal].clone())
        })
        .collect();

    let database = escape_name(database);
    let table = escape_name(table);
    let equals_comparison = build_equals_prepared_comparison(&table_columns.names())?;

    let result = format!(
        "\n\t\t\tdelete\n\t\t\t\tfrom\n\t\t\t\t\t{database}.{table}\n\t\t\t\twhere\n\t\t\t\t\t{equals_comparison}\n\t\t"
    );
    Ok((result, unique_key_args))
}

/// Batched row insert; one parenthesized placeholder tuple per row.
pub fn build_dml_insert_query(
    database: &str,
    table: &str,
    table_columns: &ColumnList,
    shared_columns: &ColumnList,
    mapped_shared_columns: &ColumnList,
    rows: &[Vec<SqlArg>],
) -> Result<(String, Vec<SqlArg>), QueryBuildError> {
    for row in rows {
        if row.len() != table_columns.len() {
            return Err(QueryBuildError::LengthMismatch {
                columns: table_columns.len(),
                values: row.len(),
                what: "args",
                builder: "build_dml_insert_query",
            });
        }
    }
    if !shared_columns.is_subset_of(table_columns) {
        return Err(QueryBuildError::NotASubset {
            builder: "build_dml_insert_query",
        });
    }
    if shared_columns.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "shared columns",
            builder: "build_dml_insert_query",
        });
    }

    let shared_args = convert_shared_args(table_columns, shared_columns, rows);

    let database = escape_name(database);
    let table = escape_name(table);
    let mapped_listing = escape_names(&mapped_shared_columns.names()).join(", ");

    let tuple = format!("({})", build_columns_prepared_values(mapped_shared_columns).join(", "));
    let tuples = vec![tuple; rows.len()].join(",");

    let result = format!(
        "\n\t\t\tinsert into\n\t\t\t\t{database}.{table}\n\t\t\t\t\t({mapped_listing})\n\t\t\t\tvalues\n\t\t\t\t\t{tuples}\n\t\t"
    );
    Ok((result, shared_args))
}

/// Row update: placeholder `SET` over the mapped shared columns, `WHERE`
/// equality over every table column.
pub fn build_dml_update_query(
    database: &str,
    table: &str,
    table_columns: &ColumnList,
    shared_columns: &ColumnList,
    mapped_shared_columns: &ColumnList,
    rows: &[Vec<SqlArg>],
    where_args: &[SqlArg],
) -> Result<(String, Vec<SqlArg>, Vec<SqlArg>), QueryBuildError> {
    for row in rows {
        if row.len() != table_columns.len() {
            return Err(QueryBuildError::LengthMismatch {
                columns: table_columns.len(),
                values: row.len(),
                what: "value args",
                builder: "build_dml_update_query",
            });
        }
    }
    if where_args.len() != table_columns.len() {
        return Err(QueryBuildError::LengthMismatch {
            columns: table_columns.len(),
            values: where_args.len(),
            what: "where args",
            builder: "build_dml_update_query",
        });
    }
    if !shared_columns.is_subset_of(table_columns) {
        return Err(QueryBuildError::NotASubset {
            builder: "build_dml_update_query",
        });
    }
    if shared_columns.is_empty() {
        return Err(QueryBuildError::Empty {
            what: "shared columns",
            builder: "build_dml_update_query",
        });
    }

    let shared_args = convert_shared_args(table_columns, shared_columns, rows);

    let unique_key_args: Vec<SqlArg> = table_columns
        .columns()
        .iter()
        .map(|column| {
            let ordinal = table_columns
                .ordinal(&column.name)
                .expect("column belongs to its own list");
            column.convert_arg(where_args[ordinal].clone())
        })
        .collect();

    let database = escape_name(database);
    let table = escape_name(table);
    let set_clause = build_set_prepared_clause(mapped_shared_columns)?;
    let equals_comparison = build_equals_prepared_comparison(&table_columns.names())?;

    let result = format!(
        "\n \t\t\tupdate\n \t\t\t\t\t{database}.{table}\n\t\t\t\tset\n\t\t\t\t\t{set_clause}\n\t\t\t\twhere\n \t\t\t\t\t{equals_comparison}\n \t\t"
    );
    Ok((result, shared_args, unique_key_args))
}

/// Per-row converted values of the shared columns, in shared-column order.
fn convert_shared_args(
    table_columns: &ColumnList,
    shared_columns: &ColumnList,
    rows: &[Vec<SqlArg>],
) -> Vec<SqlArg> {
    let mut shared_args = Vec::with_capacity(rows.len() * shared_columns.len());
    for row in rows {
        for column in shared_columns.columns() {
            let ordinal = table_columns
                .ordinal(&column.name)
                .expect("shared columns verified as a subset");
            shared_args.push(column.convert_arg(row[ordinal].clone()));
        }
    }
    shared_args
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::sql::columns::Column;

    fn normalize(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn int_args(values: &[i64]) -> Vec<SqlArg> {
        values.iter().map(|v| SqlArg::Int(*v)).collect()
    }

    #[test]
    fn escape_name_wraps_and_unquotes_once() {
        assert_eq!(escape_name("name"), "`name`");
        assert_eq!(escape_name("\"name\""), "`name`");
        assert_eq!(escape_name("`name`"), "`name`");
        assert_eq!(escape_name("'name'"), "`name`");
        // Only one round of unwrapping.
        assert_eq!(escape_name("\"`name`\""), "``name``");
    }

    #[test]
    fn value_comparison_rejects_empty_inputs() {
        assert!(build_value_comparison("", "?", ComparisonSign::Equals).is_err());
        assert!(build_value_comparison("c", "", ComparisonSign::Equals).is_err());
        assert_eq!(
            build_value_comparison("c", "?", ComparisonSign::GreaterThan).unwrap(),
            "(`c` > ?)"
        );
    }

    #[test]
    fn equals_comparison_conjunction_shape() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let values = vec!["?".to_string(), "?".to_string()];
        assert_eq!(
            build_equals_comparison(&columns, &values).unwrap(),
            "((`a` = ?) and (`b` = ?))"
        );
    }

    #[test]
    fn set_clause_binds_timezone_columns_through_convert_tz() {
        let columns = ColumnList::from_columns(vec![
            Column::new("id"),
            Column::new("ts")
                .with_kind(ColumnKind::Timestamp)
                .with_timezone_conversion("+08:00"),
        ]);
        assert_eq!(
            build_set_prepared_clause(&columns).unwrap(),
            "`id`=?, `ts`=convert_tz(?, '+08:00', '+00:00')"
        );
    }

    #[test]
    fn inclusive_range_comparison_over_two_columns() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let values = vec!["?".to_string(), "?".to_string()];
        let args = int_args(&[1, 2]);

        let (sql, exploded) = build_range_comparison(
            &columns,
            &values,
            &args,
            ComparisonSign::LessThanOrEquals,
        )
        .unwrap();

        assert_eq!(
            sql,
            "((`a` < ?) or (((`a` = ?)) AND (`b` < ?)) or ((`a` = ?) and (`b` = ?)))"
        );
        // Placeholder order: a, then a=,b, then the equality pair.
        assert_eq!(exploded, int_args(&[1, 1, 2, 1, 2]));
    }

    #[test]
    fn strict_range_comparison_has_no_equality_disjunct() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let values = vec!["?".to_string(), "?".to_string()];
        let args = int_args(&[1, 2]);

        let (sql, exploded) =
            build_range_comparison(&columns, &values, &args, ComparisonSign::GreaterThan).unwrap();

        assert_eq!(sql, "((`a` > ?) or (((`a` = ?)) AND (`b` > ?)))");
        assert_eq!(exploded, int_args(&[1, 1, 2]));
    }

    #[test]
    fn prepared_range_comparison_converts_timezones() {
        let columns = ColumnList::from_columns(vec![Column::new("ts")
            .with_kind(ColumnKind::Timestamp)
            .with_timezone_conversion("+03:00")]);
        let (sql, _) = build_range_prepared_comparison(
            &columns,
            &int_args(&[5]),
            ComparisonSign::GreaterThan,
        )
        .unwrap();
        assert_eq!(sql, "((`ts` > convert_tz(?, '+03:00', '+00:00')))");
    }

    #[test]
    fn range_insert_query_combines_both_bounds() {
        let key = ColumnList::new(&["id"]);
        let shared = vec!["id".to_string(), "name".to_string()];

        let (sql, args) = build_range_insert_prepared_query(
            "mydb",
            "tbl",
            "_tbl_gho",
            &shared,
            &shared,
            "PRIMARY",
            &key,
            &int_args(&[10]),
            &int_args(&[20]),
            true,
            true,
        )
        .unwrap();

        let normalized = normalize(&sql);
        assert!(normalized.starts_with("insert ignore into `mydb`.`_tbl_gho` (`id`, `name`)"));
        assert!(normalized.contains("select `id`, `name` from `mydb`.`tbl` force index (`PRIMARY`)"));
        assert!(normalized.contains(
            "where (((`id` > ?) or ((`id` = ?))) and ((`id` < ?) or ((`id` = ?)))) lock in share mode"
        ));
        // Start bound args first, then end bound args.
        assert_eq!(args, int_args(&[10, 10, 20, 20]));
    }

    #[test]
    fn range_select_query_applies_only_the_upper_bound() {
        let key = ColumnList::new(&["a", "b"]);
        let shared = vec!["a".to_string(), "b".to_string(), "payload".to_string()];

        let (sql, args) = build_range_select_prepared_query(
            "mydb",
            "tbl",
            &shared,
            "uniq_ab",
            &key,
            &int_args(&[3, 4]),
            500,
        )
        .unwrap();

        let normalized = normalize(&sql);
        assert!(normalized.contains("force index (`uniq_ab`)"));
        assert!(normalized.contains("order by `a` asc, `b` asc limit 500"));
        assert!(!normalized.contains(" > "), "no lower bound expected");
        assert_eq!(args, int_args(&[3, 3, 4, 3, 4]));
    }

    #[test]
    fn select_args_are_a_suffix_of_insert_args_for_shared_bounds() {
        let key = ColumnList::new(&["id"]);
        let shared = vec!["id".to_string()];

        let (_, insert_args) = build_range_insert_prepared_query(
            "db", "t", "_t_gho", &shared, &shared, "PRIMARY", &key,
            &int_args(&[10]),
            &int_args(&[20]),
            false,
            false,
        )
        .unwrap();
        let (_, select_args) =
            build_range_select_prepared_query("db", "t", &shared, "PRIMARY", &key, &int_args(&[20]), 100)
                .unwrap();

        assert!(insert_args.ends_with(&select_args));
    }

    #[test]
    fn range_end_query_nests_ascending_inside_descending_limit_one() {
        let key = ColumnList::new(&["id"]);

        let (sql, args) = build_unique_key_range_end_prepared_query(
            "mydb",
            "tbl",
            &key,
            &int_args(&[1]),
            &int_args(&[100]),
            1000,
            false,
        )
        .unwrap();

        let normalized = normalize(&sql);
        assert!(normalized.contains("from ( select `id` from `mydb`.`tbl`"));
        assert!(normalized.contains("order by `id` asc limit 1000 ) select_osc_chunk"));
        assert!(normalized.ends_with("order by `id` desc limit 1"));
        assert_eq!(args, int_args(&[1, 100, 100]));
    }

    #[test]
    fn min_max_queries_order_enum_columns_through_concat() {
        let key = ColumnList::from_columns(vec![
            Column::new("id"),
            Column::new("status").with_kind(ColumnKind::Enum),
        ]);

        let min = build_unique_key_min_values_prepared_query("db", "t", &key).unwrap();
        let max = build_unique_key_max_values_prepared_query("db", "t", &key).unwrap();

        assert!(normalize(&min).contains("order by `id` asc, concat(`status`) asc limit 1"));
        assert!(normalize(&max).contains("order by `id` desc, concat(`status`) desc limit 1"));
    }

    #[test]
    fn dml_delete_keys_on_every_column() {
        let table = ColumnList::from_columns(vec![
            Column::new("id").unsigned(),
            Column::new("name"),
        ]);

        let (sql, args) = build_dml_delete_query(
            "db",
            "t",
            &table,
            &[SqlArg::Int(-1), SqlArg::Bytes(b"bob".to_vec())],
        )
        .unwrap();

        assert!(normalize(&sql)
            .contains("delete from `db`.`t` where ((`id` = ?) and (`name` = ?))"));
        assert_eq!(
            args,
            vec![SqlArg::UInt(u64::MAX), SqlArg::Text("bob".to_string())]
        );
    }

    #[test]
    fn dml_insert_batches_rows_without_trailing_comma() {
        let table = ColumnList::new(&["id", "name", "internal"]);
        let shared = ColumnList::new(&["id", "name"]);

        let rows = vec![
            vec![SqlArg::Int(1), SqlArg::Text("a".into()), SqlArg::Null],
            vec![SqlArg::Int(2), SqlArg::Text("b".into()), SqlArg::Null],
            vec![SqlArg::Int(3), SqlArg::Text("c".into()), SqlArg::Null],
        ];

        let (sql, args) =
            build_dml_insert_query("db", "t", &table, &shared, &shared, &rows).unwrap();

        let normalized = normalize(&sql);
        assert!(normalized.contains("insert into `db`.`t` (`id`, `name`)"));
        assert!(normalized.contains("values (?, ?),(?, ?),(?, ?)"));
        assert!(!normalized.ends_with(","));
        // Row-major, shared-column order.
        assert_eq!(
            args,
            vec![
                SqlArg::Int(1),
                SqlArg::Text("a".into()),
                SqlArg::Int(2),
                SqlArg::Text("b".into()),
                SqlArg::Int(3),
                SqlArg::Text("c".into()),
            ]
        );
    }

    #[test]
    fn dml_insert_rejects_non_subset_shared_columns() {
        let table = ColumnList::new(&["id"]);
        let shared = ColumnList::new(&["id", "ghost"]);
        let rows = vec![vec![SqlArg::Int(1)]];

        assert_eq!(
            build_dml_insert_query("db", "t", &table, &shared, &shared, &rows),
            Err(QueryBuildError::NotASubset {
                builder: "build_dml_insert_query"
            })
        );
    }

    #[test]
    fn dml_update_splits_set_args_from_where_args() {
        let table = ColumnList::new(&["id", "name"]);
        let shared = ColumnList::new(&["name"]);

        let rows = vec![vec![SqlArg::Int(1), SqlArg::Text("new".into())]];
        let where_args = vec![SqlArg::Int(1), SqlArg::Text("old".into())];

        let (sql, shared_args, unique_key_args) =
            build_dml_update_query("db", "t", &table, &shared, &shared, &rows, &where_args)
                .unwrap();

        let normalized = normalize(&sql);
        assert!(normalized.contains("update `db`.`t` set `name`=?"));
        assert!(normalized.contains("where ((`id` = ?) and (`name` = ?))"));
        assert_eq!(shared_args, vec![SqlArg::Text("new".into())]);
        assert_eq!(
            unique_key_args,
            vec![SqlArg::Int(1), SqlArg::Text("old".into())]
        );
    }
}
