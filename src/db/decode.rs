//! Cell decoding helpers shared by the driver adapters.

use super::Value;
use sqlx::{ColumnIndex, Decode, Row, Type};

/// Decodes a cell as `T` and wraps it with `f`.
///
/// Returns `None` when the driver refuses the conversion, so callers can
/// try the next candidate type. SQL NULL yields `Some(Value::Null)`.
pub(crate) fn decode_as<'r, R, T, F>(row: &'r R, index: usize, f: F) -> Option<Value>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
    F: FnOnce(T) -> Value,
{
    row.try_get::<Option<T>, _>(index)
        .ok()
        .map(|v| v.map(f).unwrap_or(Value::Null))
}

/// Last-resort decoding for types without a dedicated mapping.
///
/// Tries checked text, then the raw payload as UTF-8 text, then raw bytes.
pub(crate) fn decode_fallback<'r, R>(row: &'r R, index: usize) -> Value
where
    R: Row,
    usize: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    Vec<u8>: Decode<'r, R::Database>,
{
    if let Some(value) = decode_as::<R, String, _>(row, index, Value::String) {
        return value;
    }
    if let Ok(text) = row.try_get_unchecked::<Option<String>, _>(index) {
        return text.map(Value::String).unwrap_or(Value::Null);
    }
    row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
        .ok()
        .flatten()
        .map(Value::Bytes)
        .unwrap_or(Value::Null)
}
