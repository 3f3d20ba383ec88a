//! MySQL database client implementation.

use super::decode::{decode_as, decode_fallback};
use super::{
    classify_connection_error, closed_handle_error, connection_error_message, CanonicalType,
    ColumnInfo, DatabaseClient, Dialect, QueryResult, RawColumn, Row, TableKind, TableRef, Value,
};
use crate::error::{AppError, ConnectionErrorKind, EngineDiagnostics, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{Column as SqlxColumn, Connection, Executor, Row as SqlxRow, Statement, TypeInfo};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// ER_DBACCESS_DENIED_ERROR
const ER_DBACCESS_DENIED: u16 = 1044;
/// ER_ACCESS_DENIED_ERROR
const ER_ACCESS_DENIED: u16 = 1045;
/// ER_BAD_DB_ERROR
const ER_BAD_DB: u16 = 1049;

/// Maps a MySQL column type to its canonical tag.
///
/// Takes the full `COLUMN_TYPE` (e.g. `tinyint(1)`, `int unsigned`,
/// `enum('a','b')`) or a bare driver type name. `tinyint(1)` and `bit(1)`
/// are the conventional boolean encodings.
pub fn map_mysql_type(native_type: &str) -> CanonicalType {
    let lower = native_type.trim().to_lowercase();
    if lower.starts_with("tinyint(1)") || lower.starts_with("bit(1)") || lower == "boolean" {
        return CanonicalType::Boolean;
    }

    let base = lower
        .split(['(', ' '])
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
            CanonicalType::Integer
        }
        "float" | "double" | "real" => CanonicalType::Floating,
        "decimal" | "numeric" | "dec" | "fixed" => CanonicalType::Decimal,
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "set" => {
            CanonicalType::Text
        }
        "bool" => CanonicalType::Boolean,
        "datetime" | "timestamp" => CanonicalType::Datetime,
        "date" => CanonicalType::Date,
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "bit" => {
            CanonicalType::Binary
        }
        "json" => CanonicalType::Json,
        "enum" => CanonicalType::Enum,
        _ => CanonicalType::Other,
    }
}

/// MySQL database client.
#[derive(Debug)]
pub struct MySqlClient {
    conn: Mutex<Option<MySqlConnection>>,
}

impl MySqlClient {
    /// Opens a single connection to the given URL.
    pub async fn connect(url: &Url) -> Result<Self> {
        let conn = MySqlConnection::connect(url.as_str())
            .await
            .map_err(|e| map_connection_error(e, url))?;
        debug!("Successfully connected to MySQL");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed_handle_error)?;

        let excluded = Dialect::MySql.system_schemas();
        let placeholders = vec!["?"; excluded.len()].join(", ");
        // information_schema columns are binary strings on some servers; cast to CHAR.
        let sql = format!(
            r#"
            SELECT
                CAST(TABLE_SCHEMA AS CHAR),
                CAST(TABLE_NAME AS CHAR),
                CAST(TABLE_TYPE AS CHAR)
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA NOT IN ({placeholders})
            ORDER BY TABLE_SCHEMA, TABLE_NAME
            "#
        );

        let mut query = sqlx::query_as::<_, (String, String, String)>(&sql);
        for schema in excluded {
            query = query.bind(*schema);
        }

        let rows = query
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

        let rows: Vec<(String, String, String, Option<String>, i64, String)> = sqlx::query_as(
            r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR),
                CAST(COLUMN_TYPE AS CHAR),
                CAST(IS_NULLABLE AS CHAR),
                CAST(COLUMN_DEFAULT AS CHAR),
                CAST(ORDINAL_POSITION AS SIGNED),
                CAST(COLUMN_KEY AS CHAR)
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
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
                |(name, native_type, is_nullable, default, ordinal, column_key)| RawColumn {
                    name,
                    native_type,
                    is_nullable: is_nullable == "YES",
                    default,
                    ordinal_position: ordinal.clamp(0, u32::MAX as i64) as u32,
                    is_primary_key: column_key == "PRI",
                    is_enum: false,
                },
            )
            .collect())
    }

    async fn approximate_row_count(&self, schema: &str, table: &str) -> Result<Option<i64>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed_handle_error)?;

        let estimate: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            SELECT CAST(TABLE_ROWS AS SIGNED)
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            AppError::metadata(format!("Failed to fetch row count for {schema}.{table}: {e}"))
        })?;

        Ok(estimate.flatten().filter(|n| *n > 0))
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

        let mut columns: Vec<ColumnInfo> = match result.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .map(|col| column_info(col.name(), col.type_info().name()))
                .collect(),
            None => {
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

        let mut rows = result.iter().map(convert_row).collect::<Result<Vec<Row>>>()?;
        resolve_bit_columns(&mut columns, &mut rows)?;

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
    ColumnInfo::new(name, type_name, map_mysql_type(type_name))
}

fn convert_row(row: &MySqlRow) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.name(), col.type_info().name()))
        .collect()
}

/// Converts a single cell, trying the driver type's natural Rust type first.
///
/// Types with a dedicated mapping never fall back to raw text; a cell the
/// mapping cannot decode fails the query.
fn convert_value(row: &MySqlRow, index: usize, column: &str, type_name: &str) -> Result<Value> {
    let upper = type_name.to_uppercase();
    let typed = match upper.as_str() {
        "BOOLEAN" => decode_as::<_, bool, _>(row, index, Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            decode_as::<_, i64, _>(row, index, Value::Int)
        }
        // Raw big-endian payload; `resolve_bit_columns` decides per column.
        "BIT" => decode_raw_bytes(row, index),
        t if t.ends_with("UNSIGNED") => decode_as::<_, u64, _>(row, index, |v| {
            match i64::try_from(v) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Decimal(Decimal::from(v)),
            }
        }),
        "FLOAT" => decode_as::<_, f32, _>(row, index, |v| Value::Float(v as f64)),
        "DOUBLE" => decode_as::<_, f64, _>(row, index, Value::Float),
        // DECIMAL travels as text; beyond 28 digits keep that text exactly.
        "DECIMAL" => decode_as::<_, Decimal, _>(row, index, Value::Decimal).or_else(|| {
            row.try_get_unchecked::<Option<String>, _>(index)
                .ok()
                .map(|v| v.map(Value::String).unwrap_or(Value::Null))
        }),
        "DATE" => decode_as::<_, NaiveDate, _>(row, index, Value::Date),
        "TIME" => decode_as::<_, NaiveTime, _>(row, index, Value::Time),
        "DATETIME" => decode_as::<_, NaiveDateTime, _>(row, index, Value::Timestamp),
        "TIMESTAMP" => decode_as::<_, DateTime<Utc>, _>(row, index, Value::TimestampTz),
        "JSON" => decode_as::<_, serde_json::Value, _>(row, index, Value::Json),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "GEOMETRY" => {
            decode_as::<_, Vec<u8>, _>(row, index, Value::Bytes)
        }
        _ => return Ok(decode_fallback(row, index)),
    };
    typed.ok_or_else(|| {
        AppError::execution(format!(
            "Could not decode {type_name} value in column \"{column}\""
        ))
    })
}

fn decode_raw_bytes(row: &MySqlRow, index: usize) -> Option<Value> {
    row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
        .ok()
        .map(|v| v.map(Value::Bytes).unwrap_or(Value::Null))
}

/// Retypes `BIT` result columns from their raw payloads.
///
/// The driver reports every width as plain `BIT`. A column whose non-null
/// cells are all a single byte holding 0 or 1 is a flag and becomes
/// boolean; any other `BIT` column becomes an unsigned integer.
fn resolve_bit_columns(columns: &mut [ColumnInfo], rows: &mut [Row]) -> Result<()> {
    for (index, column) in columns.iter_mut().enumerate() {
        if !column.native_type.eq_ignore_ascii_case("BIT") {
            continue;
        }

        let is_flag = rows.iter().all(|row| match row.get(index) {
            Some(Value::Bytes(bytes)) => matches!(bytes.as_slice(), [0] | [1]),
            _ => true,
        });
        column.canonical_type = if is_flag {
            CanonicalType::Boolean
        } else {
            CanonicalType::Integer
        };

        for row in rows.iter_mut() {
            let Some(cell) = row.get_mut(index) else {
                continue;
            };
            if let Value::Bytes(bytes) = cell {
                *cell = if is_flag {
                    Value::Bool(bytes.as_slice() == [1])
                } else {
                    bit_value(bytes).ok_or_else(|| {
                        AppError::execution(format!(
                            "BIT value in column \"{}\" is wider than 64 bits",
                            column.name
                        ))
                    })?
                };
            }
        }
    }
    Ok(())
}

/// Reads a big-endian `BIT(n)` payload as an integer.
fn bit_value(bytes: &[u8]) -> Option<Value> {
    if bytes.len() > 8 {
        return None;
    }
    let value = bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    Some(match i64::try_from(value) {
        Ok(i) => Value::Int(i),
        Err(_) => Value::Decimal(Decimal::from(value)),
    })
}

/// Maps sqlx connection errors to typed connection errors.
///
/// MySQL error numbers are checked first; message text is the fallback.
fn map_connection_error(error: sqlx::Error, url: &Url) -> AppError {
    let kind = error
        .as_database_error()
        .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
        .and_then(|db| match db.number() {
            ER_ACCESS_DENIED | ER_DBACCESS_DENIED => {
                Some(ConnectionErrorKind::AuthenticationRejected)
            }
            ER_BAD_DB => Some(ConnectionErrorKind::DatabaseMissing),
            _ => None,
        })
        .unwrap_or_else(|| classify_connection_error(&error));

    AppError::connection(kind, connection_error_message(kind, url, Dialect::MySql, &error))
}

/// Maps a failed statement to an execution error carrying the server's
/// message verbatim and its error number as diagnostics.
fn query_error(error: sqlx::Error) -> AppError {
    let Some(db_error) = error.as_database_error() else {
        return AppError::execution(error.to_string());
    };

    let native_code = db_error
        .try_downcast_ref::<MySqlDatabaseError>()
        .map(|e| e.number().to_string());
    let diagnostics = EngineDiagnostics {
        native_code,
        ..EngineDiagnostics::default()
    };
    AppError::execution_with(db_error.message(), diagnostics)
}
