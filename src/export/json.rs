//! JSON writer: one array of row objects, pretty-printed.

use crate::db::{Row, Value};
use crate::error::{AppError, Result};
use crate::query::QueryResultSet;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

struct ExportRow<'a> {
    names: &'a [String],
    row: &'a Row,
}

impl Serialize for ExportRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.names.len()))?;
        for (index, name) in self.names.iter().enumerate() {
            map.serialize_entry(name, self.row.get(index).unwrap_or(&Value::Null))?;
        }
        map.end()
    }
}

pub(super) fn write(names: &[String], result: &QueryResultSet) -> Result<Vec<u8>> {
    let rows: Vec<ExportRow<'_>> = result
        .rows
        .iter()
        .map(|row| ExportRow { names, row })
        .collect();

    serde_json::to_vec_pretty(&rows)
        .map_err(|e| AppError::export(format!("Failed to write JSON: {e}")))
}
