//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! over a single sqlx connection.

use super::decode::{decode_as, decode_fallback};
use super::{
    classify_connection_error, closed_handle_error, connection_error_message, CanonicalType,
    ColumnInfo, DatabaseClient, Dialect, QueryResult, RawColumn, Row, TableKind, TableRef, Value,
};
use crate::error::{AppError, ConnectionErrorKind, EngineDiagnostics, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgDatabaseError, PgRow, PgValueFormat};
use sqlx::{
    Column as SqlxColumn, Connection, Executor, Row as SqlxRow, Statement, TypeInfo, ValueRef,
};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Maps a PostgreSQL type name to its canonical tag.
///
/// Accepts both `information_schema.columns.data_type` spellings
/// (`character varying`, `timestamp with time zone`) and the short
/// `udt_name`/driver spellings (`varchar`, `timestamptz`).
pub fn map_postgres_type(native_type: &str) -> CanonicalType {
    let lower = native_type.trim().to_lowercase();
    if lower.starts_with('_') || lower.ends_with("[]") || lower == "array" {
        return CanonicalType::Other;
    }
    let base = lower.split('(').next().unwrap_or_default().trim();

    match base {
        "smallint" | "int2" | "integer" | "int" | "int4" | "bigint" | "int8" | "smallserial"
        | "serial" | "bigserial" | "serial2" | "serial4" | "serial8" | "oid" => {
            CanonicalType::Integer
        }
        "real" | "float4" | "double precision" | "float8" => CanonicalType::Floating,
        "numeric" | "decimal" => CanonicalType::Decimal,
        "text" | "character varying" | "varchar" | "character" | "char" | "bpchar" | "name"
        | "citext" | "uuid" => CanonicalType::Text,
        "boolean" | "bool" => CanonicalType::Boolean,
        "timestamp" | "timestamp without time zone" | "timestamptz"
        | "timestamp with time zone" => CanonicalType::Datetime,
        "date" => CanonicalType::Date,
        "bytea" => CanonicalType::Binary,
        "json" | "jsonb" => CanonicalType::Json,
        _ => CanonicalType::Other,
    }
}

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    conn: Mutex<Option<PgConnection>>,
}

impl PostgresClient {
    /// Opens a single connection to the given URL.
    pub async fn connect(url: &Url) -> Result<Self> {
        let conn = PgConnection::connect(url.as_str())
            .await
            .map_err(|e| map_connection_error(e, url))?;
        debug!("Successfully connected to PostgreSQL");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed_handle_error)?;

        let excluded: Vec<String> = Dialect::Postgres
            .system_schemas()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                t.table_schema::text,
                t.table_name::text,
                t.table_type::text
            FROM information_schema.tables t
            WHERE t.table_schema::text <> ALL($1)
            ORDER BY t.table_schema, t.table_name
            "#,
        )
        .bind(excluded)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::metadata(format!("Failed to list tables: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(schema, name, table_type)| {
                TableRef::new(schema, name, TableKind::from_catalog(&table_type))
            })
            .collect())
    }

    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<RawColumn>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed_handle_error)?;

        let rows: Vec<(String, String, String, Option<String>, i32, bool, bool)> =
            sqlx::query_as(
                r#"
            SELECT
                c.column_name::text,
                CASE
                    WHEN c.data_type IN ('USER-DEFINED', 'ARRAY') THEN c.udt_name::text
                    ELSE c.data_type::text
                END AS native_type,
                c.is_nullable::text,
                c.column_default::text,
                c.ordinal_position::int4,
                EXISTS (
                    SELECT 1
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage kcu
                        ON tc.constraint_name = kcu.constraint_name
                        AND tc.table_schema = kcu.table_schema
                        AND tc.table_name = kcu.table_name
                    WHERE tc.constraint_type = 'PRIMARY KEY'
                        AND tc.table_schema = c.table_schema
                        AND tc.table_name = c.table_name
                        AND kcu.column_name = c.column_name
                ) AS is_primary_key,
                EXISTS (
                    SELECT 1
                    FROM pg_catalog.pg_type t
                    JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
                    WHERE t.typname = c.udt_name::text
                        AND n.nspname = c.udt_schema::text
                        AND t.typtype = 'e'
                ) AS is_enum
            FROM information_schema.columns c
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
            "#,
            )
            .bind(schema)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                AppError::metadata(format!("Failed to fetch columns for {schema}.{table}: {e}"))
            })?;

        Ok(rows
            .into_iter()
            .map(
                |(name, native_type, is_nullable, default, ordinal, is_pk, is_enum)| RawColumn {
                    name,
                    native_type,
                    is_nullable: is_nullable == "YES",
                    default,
                    ordinal_position: ordinal.max(0) as u32,
                    is_primary_key: is_pk,
                    is_enum,
                },
            )
            .collect())
    }

    async fn approximate_row_count(&self, schema: &str, table: &str) -> Result<Option<i64>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed_handle_error)?;

        // reltuples is -1 for never-analyzed tables and 0 for empty ones.
        let estimate: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT c.reltuples::bigint
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            AppError::metadata(format!("Failed to fetch row count for {schema}.{table}: {e}"))
        })?;

        Ok(estimate.filter(|n| *n > 0))
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed_handle_error)?;

        let start = Instant::now();
        let result = sqlx::query(sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(query_error)?;
        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = match result.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .map(|col| column_info(col.name(), col.type_info().name()))
                .collect(),
            None => {
                // No rows to read column metadata from; ask the server instead.
                let statement = (&mut *conn)
                    .prepare(sql)
                    .await
                    .map_err(query_error)?;
                statement
                    .columns()
                    .iter()
                    .map(|col| column_info(col.name(), col.type_info().name()))
                    .collect()
            }
        };

        let rows = result.iter().map(convert_row).collect::<Result<Vec<Row>>>()?;

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
        })
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.close()
                .await
                .map_err(|e| AppError::internal(format!("Failed to close connection: {e}")))?;
        }
        Ok(())
    }
}

fn column_info(name: &str, type_name: &str) -> ColumnInfo {
    ColumnInfo::new(name, type_name, map_postgres_type(type_name))
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.name(), col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
///
/// Types with a dedicated mapping never fall back to raw text; a cell the
/// mapping cannot decode fails the query.
fn convert_value(row: &PgRow, index: usize, column: &str, type_name: &str) -> Result<Value> {
    let typed = match type_name.to_uppercase().as_str() {
        "BOOL" => decode_as::<_, bool, _>(row, index, Value::Bool),
        "INT2" => decode_as::<_, i16, _>(row, index, |v| Value::Int(v as i64)),
        "INT4" => decode_as::<_, i32, _>(row, index, |v| Value::Int(v as i64)),
        "INT8" => decode_as::<_, i64, _>(row, index, Value::Int),
        "OID" => decode_as::<_, sqlx::postgres::types::Oid, _>(row, index, |v| {
            Value::Int(v.0 as i64)
        }),
        "FLOAT4" => decode_as::<_, f32, _>(row, index, |v| Value::Float(v as f64)),
        "FLOAT8" => decode_as::<_, f64, _>(row, index, Value::Float),
        "NUMERIC" => decode_as::<_, Decimal, _>(row, index, Value::Decimal)
            .or_else(|| decode_wide_numeric(row, index)),
        "BYTEA" => decode_as::<_, Vec<u8>, _>(row, index, Value::Bytes),
        "DATE" => decode_as::<_, NaiveDate, _>(row, index, Value::Date),
        "TIME" => decode_as::<_, NaiveTime, _>(row, index, Value::Time),
        "TIMESTAMP" => decode_as::<_, NaiveDateTime, _>(row, index, Value::Timestamp),
        "TIMESTAMPTZ" => decode_as::<_, DateTime<Utc>, _>(row, index, Value::TimestampTz),
        "JSON" | "JSONB" => decode_as::<_, serde_json::Value, _>(row, index, Value::Json),
        "UUID" => decode_as::<_, uuid::Uuid, _>(row, index, |v| Value::String(v.to_string())),
        _ => return Ok(decode_fallback(row, index)),
    };
    typed.ok_or_else(|| {
        AppError::execution(format!(
            "Could not decode {type_name} value in column \"{column}\""
        ))
    })
}

/// Decodes a NUMERIC outside the range of `Decimal` (NaN, infinities,
/// more than 28 significant digits) as its exact decimal text.
fn decode_wide_numeric(row: &PgRow, index: usize) -> Option<Value> {
    let raw = row.try_get_raw(index).ok()?;
    if raw.is_null() {
        return Some(Value::Null);
    }
    let text = match raw.format() {
        PgValueFormat::Binary => numeric_to_string(raw.as_bytes().ok()?)?,
        PgValueFormat::Text => raw.as_str().ok()?.to_string(),
    };
    Some(Value::String(text))
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Renders the binary NUMERIC wire format: `ndigits`, `weight`, `sign`,
/// `dscale`, then `ndigits` base-10000 digits, all big-endian 16-bit.
///
/// Returns `None` for a malformed payload.
fn numeric_to_string(bytes: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<u16> {
        let pair = bytes.get(i * 2..i * 2 + 2)?;
        Some(u16::from_be_bytes([pair[0], pair[1]]))
    };

    let ndigits = usize::from(word(0)?);
    let weight = i64::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);

    match sign {
        NUMERIC_NAN => return Some("NaN".to_string()),
        NUMERIC_PINF => return Some("Infinity".to_string()),
        NUMERIC_NINF => return Some("-Infinity".to_string()),
        0 | NUMERIC_NEG => {}
        _ => return None,
    }

    let digits = (0..ndigits)
        .map(|i| word(4 + i).filter(|d| *d < 10_000))
        .collect::<Option<Vec<u16>>>()?;
    // Digit at index i has the value digits[i] * 10000^(weight - i).
    let digit_at = |i: i64| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit_at(0).to_string());
        for i in 1..=weight {
            out.push_str(&format!("{:04}", digit_at(i)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Some(out)
}

/// Maps sqlx connection errors to typed connection errors.
///
/// SQLSTATE codes are checked first; message text is the fallback.
fn map_connection_error(error: sqlx::Error, url: &Url) -> AppError {
    let kind = error
        .as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| match code.as_ref() {
            "28P01" | "28000" => Some(ConnectionErrorKind::AuthenticationRejected),
            "3D000" => Some(ConnectionErrorKind::DatabaseMissing),
            _ => None,
        })
        .unwrap_or_else(|| classify_connection_error(&error));

    AppError::connection(
        kind,
        connection_error_message(kind, url, Dialect::Postgres, &error),
    )
}

/// Maps a failed statement to an execution error.
///
/// The server's message is kept verbatim; SQLSTATE, DETAIL and HINT travel
/// as diagnostics.
fn query_error(error: sqlx::Error) -> AppError {
    let Some(db_error) = error.as_database_error() else {
        return AppError::execution(error.to_string());
    };

    let pg_error = db_error.try_downcast_ref::<PgDatabaseError>();
    let diagnostics = EngineDiagnostics {
        native_code: db_error.code().map(|c| c.into_owned()),
        detail: pg_error.and_then(|e| e.detail()).map(str::to_string),
        hint: pg_error.and_then(|e| e.hint()).map(str::to_string),
    };
    AppError::execution_with(db_error.message(), diagnostics)
}
