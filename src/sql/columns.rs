//! Column metadata and argument values used by the statement builders.

use std::collections::HashMap;

/// A value bound to a `?` placeholder.
///
/// Mirrors the subset of MySQL value space the binlog applier produces.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlArg {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Column type classification, as far as the builders care.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColumnKind {
    #[default]
    Unknown,
    Timestamp,
    DateTime,
    Enum,
    MediumInt,
    Json,
    Float,
}

/// Timezone metadata attached to time-typed columns whose values arrive in
/// a session timezone and must be normalized to UTC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimezoneConversion {
    /// Source timezone of incoming values (e.g. `"+08:00"`).
    pub to_timezone: String,
}

/// Metadata of one table column.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    /// Whether the MySQL type is unsigned; negative binlog integers are
    /// reinterpreted through two's complement on conversion.
    pub is_unsigned: bool,
    pub timezone_conversion: Option<TimezoneConversion>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Unknown,
            is_unsigned: false,
            timezone_conversion: None,
        }
    }

    pub fn with_kind(mut self, kind: ColumnKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.is_unsigned = true;
        self
    }

    pub fn with_timezone_conversion(mut self, to_timezone: impl Into<String>) -> Self {
        self.timezone_conversion = Some(TimezoneConversion {
            to_timezone: to_timezone.into(),
        });
        self
    }

    /// Converts a raw binlog argument into its bindable form for this
    /// column: unsigned columns reinterpret negative integers, textual
    /// columns turn byte payloads into strings.
    pub fn convert_arg(&self, arg: SqlArg) -> SqlArg {
        match arg {
            SqlArg::Int(v) if self.is_unsigned && v < 0 => SqlArg::UInt(v as u64),
            SqlArg::Bytes(bytes) if !self.is_unsigned => {
                SqlArg::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            other => other,
        }
    }
}

/// An ordered list of columns with name-to-ordinal lookup.
#[derive(Clone, Debug, Default)]
pub struct ColumnList {
    columns: Vec<Column>,
    ordinals: HashMap<String, usize>,
}

impl ColumnList {
    /// Builds a list of plain columns from names.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self::from_columns(names.iter().map(|n| Column::new(n.as_ref())).collect())
    }

    /// Builds a list from full column metadata.
    pub fn from_columns(columns: Vec<Column>) -> Self {
        let ordinals = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { columns, ordinals }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of `name` in the table's column order.
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.ordinals.get(name).copied()
    }

    /// Whether every column of `self` appears in `other` (by name).
    pub fn is_subset_of(&self, other: &ColumnList) -> bool {
        self.columns
            .iter()
            .all(|c| other.ordinals.contains_key(&c.name))
    }
}
