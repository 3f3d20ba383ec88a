//! Canonical, JSON-representable query results.

use super::disambiguate_column_names;
use crate::db::{CanonicalType, ColumnInfo, QueryResult, Row, Value};
use crate::error::{AppError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Result of one executed query, after canonicalization.
///
/// Column names are unique and every cell is one of: null, boolean,
/// integer, finite float, text, date, time, timestamp or JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResultSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
    pub execution_time: Duration,
}

impl QueryResultSet {
    /// Canonicalizes a raw adapter result.
    pub fn from_raw(raw: QueryResult, execution_time: Duration) -> Self {
        let QueryResult {
            mut columns,
            mut rows,
            ..
        } = raw;

        let unique = disambiguate_column_names(
            &columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        );
        for (column, name) in columns.iter_mut().zip(unique) {
            column.name = name;
        }

        for (index, column) in columns.iter().enumerate() {
            let utf8_binary = rows.iter().all(|row| match row.get(index) {
                Some(Value::Bytes(bytes)) => std::str::from_utf8(bytes).is_ok(),
                _ => true,
            });
            for row in rows.iter_mut() {
                if let Some(cell) = row.get_mut(index) {
                    let value = std::mem::take(cell);
                    *cell = canonical_cell(value, column.canonical_type, utf8_binary);
                }
            }
        }

        Self {
            columns,
            rows,
            execution_time,
        }
    }

    /// Rebuilds a result set posted back by a client.
    ///
    /// Expects `columns` (names, or objects with a `name`) and `rows`
    /// (objects keyed by column name, or positional arrays). Column types are
    /// inferred from the values; ISO-8601 strings become dates or timestamps
    /// when every non-null cell of the column parses.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| AppError::export("Result set must be a JSON object"))?;

        let names = object
            .get("columns")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| AppError::export("Result set has no 'columns' array"))?
            .iter()
            .map(column_name)
            .collect::<Result<Vec<_>>>()?;

        let raw_rows = match object.get("rows") {
            Some(JsonValue::Array(rows)) => rows.as_slice(),
            Some(JsonValue::Null) | None => &[],
            Some(_) => return Err(AppError::export("Result set 'rows' must be an array")),
        };

        let grid = raw_rows
            .iter()
            .map(|row| row_cells(row, &names))
            .collect::<Result<Vec<_>>>()?;

        let execution_time = object
            .get("executionTime")
            .and_then(JsonValue::as_f64)
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| Duration::from_secs_f64(ms / 1000.0))
            .unwrap_or_default();

        let unique = disambiguate_column_names(&names);
        let mut columns = Vec::with_capacity(names.len());
        let mut rows: Vec<Row> = vec![Vec::with_capacity(names.len()); grid.len()];

        for (index, name) in unique.into_iter().enumerate() {
            let cells: Vec<&JsonValue> = grid.iter().map(|r| r[index]).collect();
            let tag = infer_type(&cells);
            columns.push(ColumnInfo::new(name, "json", tag));
            for (row, cell) in rows.iter_mut().zip(cells) {
                row.push(typed_cell(cell, tag));
            }
        }

        Ok(Self {
            columns,
            rows,
            execution_time,
        })
    }

    /// Number of rows actually returned.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Execution time in milliseconds, rounded to 2 decimal places.
    pub fn execution_time_ms(&self) -> f64 {
        (self.execution_time.as_secs_f64() * 100_000.0).round() / 100.0
    }

    /// Iterates rows as name-keyed, column-ordered records.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |row| Record {
            columns: &self.columns,
            row,
        })
    }
}

fn canonical_cell(value: Value, column_type: CanonicalType, utf8_binary: bool) -> Value {
    match value {
        Value::Decimal(d) => d
            .to_f64()
            .map(Value::Float)
            .unwrap_or_else(|| Value::String(d.normalize().to_string())),
        Value::Float(f) if f.is_nan() => Value::String("NaN".to_string()),
        Value::Float(f) if f.is_infinite() => {
            let text = if f > 0.0 { "Infinity" } else { "-Infinity" };
            Value::String(text.to_string())
        }
        Value::Int(i) if column_type == CanonicalType::Boolean && (i == 0 || i == 1) => {
            Value::Bool(i == 1)
        }
        Value::Bytes(bytes) if utf8_binary => match String::from_utf8(bytes) {
            Ok(text) => Value::String(text),
            Err(e) => Value::String(BASE64.encode(e.into_bytes())),
        },
        Value::Bytes(bytes) => Value::String(BASE64.encode(bytes)),
        other => other,
    }
}

fn column_name(value: &JsonValue) -> Result<String> {
    match value {
        JsonValue::String(name) => Ok(name.clone()),
        JsonValue::Object(map) => map
            .get("name")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::export("Column object has no 'name'")),
        other => Err(AppError::export(format!("Invalid column entry: {other}"))),
    }
}

fn row_cells<'a>(row: &'a JsonValue, names: &[String]) -> Result<Vec<&'a JsonValue>> {
    const NULL: &JsonValue = &JsonValue::Null;
    match row {
        JsonValue::Object(map) => Ok(names
            .iter()
            .map(|name| map.get(name).unwrap_or(NULL))
            .collect()),
        JsonValue::Array(cells) => Ok((0..names.len())
            .map(|i| cells.get(i).unwrap_or(NULL))
            .collect()),
        other => Err(AppError::export(format!(
            "Row must be an object or array, got {other}"
        ))),
    }
}

fn infer_type(cells: &[&JsonValue]) -> CanonicalType {
    let present: Vec<&JsonValue> = cells.iter().copied().filter(|c| !c.is_null()).collect();
    if present.is_empty() {
        return CanonicalType::Text;
    }

    if present.iter().all(|c| c.is_boolean()) {
        CanonicalType::Boolean
    } else if present.iter().all(|c| c.is_i64() || c.is_u64()) {
        CanonicalType::Integer
    } else if present.iter().all(|c| c.is_number()) {
        CanonicalType::Floating
    } else if present.iter().all(|c| c.as_str().is_some_and(|s| parse_date(s).is_some())) {
        CanonicalType::Date
    } else if present
        .iter()
        .all(|c| c.as_str().is_some_and(|s| parse_datetime(s).is_some()))
    {
        CanonicalType::Datetime
    } else if present.iter().all(|c| c.is_object() || c.is_array()) {
        CanonicalType::Json
    } else {
        CanonicalType::Text
    }
}

fn typed_cell(cell: &JsonValue, tag: CanonicalType) -> Value {
    match (cell, tag) {
        (JsonValue::Null, _) => Value::Null,
        (JsonValue::Bool(b), CanonicalType::Boolean) => Value::Bool(*b),
        (JsonValue::Number(n), CanonicalType::Integer) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        (JsonValue::Number(n), CanonicalType::Floating) => {
            n.as_f64().map(Value::Float).unwrap_or(Value::Null)
        }
        (JsonValue::String(s), CanonicalType::Date) => {
            parse_date(s).map(Value::Date).unwrap_or_else(|| s.clone().into())
        }
        (JsonValue::String(s), CanonicalType::Datetime) => {
            parse_datetime(s).unwrap_or_else(|| s.clone().into())
        }
        (JsonValue::String(s), _) => Value::String(s.clone()),
        (other, CanonicalType::Json) => Value::Json(other.clone()),
        (other, _) => Value::String(other.to_string()),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_datetime(s: &str) -> Option<Value> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(Value::TimestampTz(ts.with_timezone(&Utc)));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(Value::Timestamp)
}

/// One row viewed as an ordered mapping from column name to value.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [ColumnInfo],
    row: &'a Row,
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.row.iter()) {
            map.serialize_entry(&column.name, value)?;
        }
        map.end()
    }
}

struct Records<'a>(&'a QueryResultSet);

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.records())
    }
}

impl Serialize for QueryResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("QueryResultSet", 5)?;
        state.serialize_field("columns", &self.column_names())?;
        state.serialize_field("columnTypes", &self.columns)?;
        state.serialize_field("rows", &Records(self))?;
        state.serialize_field("rowCount", &self.row_count())?;
        state.serialize_field("executionTime", &self.execution_time_ms())?;
        state.end()
    }
}
