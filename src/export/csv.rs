//! CSV writer: UTF-8 with BOM, CRLF rows, minimal quoting.

use crate::error::{AppError, Result};
use crate::query::QueryResultSet;
use csv::{QuoteStyle, Terminator, WriterBuilder};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub(super) fn write(names: &[String], result: &QueryResultSet) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::CRLF)
        .from_writer(UTF8_BOM.to_vec());

    writer.write_record(names).map_err(csv_error)?;
    for row in &result.rows {
        // NULL is written as an empty field.
        writer
            .write_record(row.iter().map(|value| value.to_text()))
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::export(format!("Failed to finish CSV: {}", e.error())))
}

fn csv_error(error: csv::Error) -> AppError {
    AppError::export(format!("Failed to write CSV: {error}"))
}
