use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pixie_errors::{ApiError, ApiResult};

use crate::column::{ColumnType, Schema};
use crate::row::Row;
use crate::value::Value;

/// One column's worth of raw values from a row-batch, still columnar.
///
/// This is the shape the transport hands the decoder: one `Vec` per column,
/// all the same length (`num_rows`). [`decode_row_batch`] transposes these
/// into row-major [`Row`]s against the table's [`Schema`].
#[derive(Debug, Clone)]
pub enum TypedColumn {
    Boolean(Vec<bool>),
    Int64(Vec<i64>),
    /// High/low 64-bit halves of each UINT128 value, in wire order.
    Uint128(Vec<(u64, u64)>),
    Float64(Vec<f64>),
    String(Vec<String>),
    TimeNanos(Vec<i64>),
    DurationNanos(Vec<i64>),
}

impl TypedColumn {
    fn column_type(&self) -> ColumnType {
        match self {
            TypedColumn::Boolean(_) => ColumnType::Boolean,
            TypedColumn::Int64(_) => ColumnType::Int64,
            TypedColumn::Uint128(_) => ColumnType::Uint128,
            TypedColumn::Float64(_) => ColumnType::Float64,
            TypedColumn::String(_) => ColumnType::String,
            TypedColumn::TimeNanos(_) => ColumnType::TimeNanos,
            TypedColumn::DurationNanos(_) => ColumnType::DurationNanos,
        }
    }

    fn len(&self) -> usize {
        match self {
            TypedColumn::Boolean(v) => v.len(),
            TypedColumn::Int64(v) => v.len(),
            TypedColumn::Uint128(v) => v.len(),
            TypedColumn::Float64(v) => v.len(),
            TypedColumn::String(v) => v.len(),
            TypedColumn::TimeNanos(v) => v.len(),
            TypedColumn::DurationNanos(v) => v.len(),
        }
    }

    fn value_at(&self, i: usize) -> Value {
        match self {
            TypedColumn::Boolean(v) => Value::Bool(v[i]),
            TypedColumn::Int64(v) => Value::Int64(v[i]),
            TypedColumn::Uint128(v) => {
                let (high, low) = v[i];
                Value::uint128(high, low)
            }
            TypedColumn::Float64(v) => Value::Float64(v[i]),
            TypedColumn::String(v) => Value::String(v[i].clone()),
            TypedColumn::TimeNanos(v) => Value::Time(nanos_to_datetime(v[i])),
            TypedColumn::DurationNanos(v) => Value::Duration(Duration::nanoseconds(v[i])),
        }
    }
}

fn nanos_to_datetime(nanos: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(
        nanos.div_euclid(1_000_000_000),
        nanos.rem_euclid(1_000_000_000) as u32,
    )
    .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
}

/// Decodes a row-batch's columnar data into an ordered list of [`Row`]s.
///
/// `columns` must have exactly one entry per schema column, in schema
/// order, each the same length (`num_rows`); a mismatched column type at
/// any position is a fatal protocol error, matching the schema/row-batch
/// coupling described for the unknown-column-type case in the decoder's
/// contract.
pub fn decode_row_batch(
    schema: &Arc<Schema>,
    columns: Vec<TypedColumn>,
    num_rows: usize,
) -> ApiResult<Vec<Row>> {
    if columns.len() != schema.len() {
        return Err(ApiError::protocol(format!(
            "row batch has {} columns, schema has {}",
            columns.len(),
            schema.len()
        )));
    }
    for (col, schema_col) in columns.iter().zip(schema.columns()) {
        if col.column_type() != schema_col.ty {
            return Err(ApiError::protocol(format!(
                "column '{}' has type {} in schema but {} in row batch",
                schema_col.name,
                schema_col.ty,
                col.column_type()
            )));
        }
        if col.len() != num_rows {
            return Err(ApiError::protocol(format!(
                "column '{}' has {} values, expected {num_rows}",
                schema_col.name,
                col.len()
            )));
        }
    }

    let mut rows = Vec::with_capacity(num_rows);
    for row_idx in 0..num_rows {
        let values = columns.iter().map(|c| c.value_at(row_idx)).collect();
        rows.push(Row::new(schema.clone(), values));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;

    fn http_schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(vec![
                Column {
                    name: "http_resp_body".into(),
                    ty: ColumnType::String,
                },
                Column {
                    name: "http_resp_status".into(),
                    ty: ColumnType::Int64,
                },
            ])
            .unwrap(),
        )
    }

    #[test]
    fn decodes_columnar_batch_into_rows_in_order() {
        let schema = http_schema();
        let columns = vec![
            TypedColumn::String(vec!["foo".into(), "bar".into(), "baz".into()]),
            TypedColumn::Int64(vec![200, 500, 301]),
        ];
        let rows = decode_row_batch(&schema, columns, 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["http_resp_body"].as_str(), Some("foo"));
        assert_eq!(rows[2]["http_resp_status"].as_i64(), Some(301));
    }

    #[test]
    fn rejects_column_type_mismatch() {
        let schema = http_schema();
        let columns = vec![
            TypedColumn::String(vec!["foo".into()]),
            TypedColumn::String(vec!["oops".into()]),
        ];
        let err = decode_row_batch(&schema, columns, 1).unwrap_err();
        assert!(matches!(err, ApiError::ProtocolError(_)));
    }

    #[test]
    fn uint128_column_renders_as_uuid() {
        let schema = Arc::new(
            Schema::new(vec![Column {
                name: "upid".into(),
                ty: ColumnType::Uint128,
            }])
            .unwrap(),
        );
        let rows =
            decode_row_batch(&schema, vec![TypedColumn::Uint128(vec![(123, 456)])], 1).unwrap();
        assert_eq!(
            rows[0]["upid"].as_uuid().unwrap().to_string(),
            "00000000-0000-007b-0000-0000000001c8"
        );
    }
}
