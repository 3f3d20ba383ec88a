//! Canonical value and type representations.
//!
//! Every adapter converts driver-native cells into [`Value`] and every
//! driver-native type name into a [`CanonicalType`], so the executor and
//! the export engine never see dialect-specific representations.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Engine-agnostic type classification of a column or cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalType {
    Integer,
    Floating,
    Decimal,
    Text,
    Boolean,
    Datetime,
    Date,
    Binary,
    Json,
    Enum,
    Other,
}

impl CanonicalType {
    /// Returns the tag as it appears in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Floating => "floating",
            Self::Decimal => "decimal",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Date => "date",
            Self::Binary => "binary",
            Self::Json => "json",
            Self::Enum => "enum",
            Self::Other => "other",
        }
    }

    /// Returns true for integer, floating and decimal.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Floating | Self::Decimal)
    }

    /// Returns true for date and datetime.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Datetime)
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name as reported by the driver (or after disambiguation).
    pub name: String,

    /// Driver-native type name.
    pub native_type: String,

    /// Canonical type tag.
    pub canonical_type: CanonicalType,
}

impl ColumnInfo {
    /// Creates a new column info.
    pub fn new(
        name: impl Into<String>,
        native_type: impl Into<String>,
        canonical_type: CanonicalType,
    ) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.into(),
            canonical_type,
        }
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// Raw output of one adapter `execute` call, before canonicalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column metadata for the result set, in driver order.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data; each row has one value per column.
    pub rows: Vec<Row>,

    /// Time spent in the driver.
    pub execution_time: Duration,
}

impl QueryResult {
    /// Creates a query result with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            execution_time: Duration::ZERO,
        }
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Exact numeric value.
    Decimal(Decimal),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Calendar date.
    Date(NaiveDate),

    /// Time of day.
    Time(NaiveTime),

    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),

    /// Timestamp with time zone, normalized to UTC.
    TimestampTz(DateTime<Utc>),

    /// JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the canonical type this value naturally belongs to.
    ///
    /// NULL carries no type information and yields `None`.
    pub fn canonical_type(&self) -> Option<CanonicalType> {
        let tag = match self {
            Value::Null => return None,
            Value::Bool(_) => CanonicalType::Boolean,
            Value::Int(_) => CanonicalType::Integer,
            Value::Float(_) => CanonicalType::Floating,
            Value::Decimal(_) => CanonicalType::Decimal,
            Value::String(_) => CanonicalType::Text,
            Value::Bytes(_) => CanonicalType::Binary,
            Value::Date(_) => CanonicalType::Date,
            Value::Time(_) => CanonicalType::Other,
            Value::Timestamp(_) | Value::TimestampTz(_) => CanonicalType::Datetime,
            Value::Json(_) => CanonicalType::Json,
        };
        Some(tag)
    }

    /// Returns the value as plain text, with NULL as the empty string.
    ///
    /// Temporal values use ISO-8601; binary values use base64.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(d) => d.normalize().to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => BASE64.encode(b),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            Value::Timestamp(ts) => ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            Value::TimestampTz(ts) => ts.to_rfc3339(),
            Value::Json(v) => v.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            other => f.write_str(&other.to_text()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(f) => Err(S::Error::custom(format!(
                "non-finite float {f} has no JSON representation"
            ))),
            Value::Decimal(d) => match d.to_f64() {
                Some(f) => serializer.serialize_f64(f),
                None => Err(S::Error::custom(format!("decimal {d} out of range"))),
            },
            Value::Json(v) => v.serialize(serializer),
            other => serializer.serialize_str(&other.to_text()),
        }
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::TimestampTz(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
