use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use pixie_errors::{ApiError, ApiResult};

/// The fixed set of scalar types a server column can carry.
///
/// Corresponds 1:1 to the wire-level type tags (`BOOLEAN`, `INT64`,
/// `UINT128`, `FLOAT64`, `STRING`, `TIME64NS`, `DURATION64NS`); an unknown
/// tag is a fatal protocol error rather than a variant of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    Int64,
    /// An unsigned 128-bit integer, conventionally rendered as a hyphenated
    /// UUID string (see [`crate::value::Value::Uuid`]).
    Uint128,
    Float64,
    String,
    TimeNanos,
    DurationNanos,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Int64 => "INT64",
            ColumnType::Uint128 => "UINT128",
            ColumnType::Float64 => "FLOAT64",
            ColumnType::String => "STRING",
            ColumnType::TimeNanos => "TIME64NS",
            ColumnType::DurationNanos => "DURATION64NS",
        };
        f.write_str(s)
    }
}

/// One (name, type) pair in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// The decoded relation of a table: an ordered, name-unique list of columns.
///
/// Created once when a table-metadata message is seen and immutable
/// thereafter; every [`crate::row::Row`] produced for the table shares the
/// same `Schema` via `Arc` rather than copying it per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
    index_by_name: Arc<HashMap<String, usize>>,
}

impl Schema {
    /// Builds a schema from the table-metadata message's column list.
    ///
    /// Fails with [`ApiError::ProtocolError`] if a column name repeats;
    /// column names must be unique across a table.
    pub fn new(columns: Vec<Column>) -> ApiResult<Self> {
        let mut index_by_name = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if index_by_name.insert(col.name.clone(), i).is_some() {
                return Err(ApiError::protocol(format!(
                    "duplicate column name '{}' in table schema",
                    col.name
                )));
            }
        }
        Ok(Schema {
            columns,
            index_by_name: Arc::new(index_by_name),
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }
}
