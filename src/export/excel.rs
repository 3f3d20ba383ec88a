//! XLSX writer.
//!
//! One sheet named "Query Results" with a bold header row. Numbers,
//! booleans and dates are written as native cells; NULL leaves the cell
//! empty.

use crate::db::Value;
use crate::error::{AppError, Result};
use crate::query::QueryResultSet;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

const SHEET_NAME: &str = "Query Results";
const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

struct CellFormats {
    number: Format,
    date: Format,
    datetime: Format,
}

pub(super) fn write(names: &[String], result: &QueryResultSet) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME).map_err(xlsx_error)?;

    let header = Format::new().set_bold();
    for (col, name) in names.iter().enumerate() {
        worksheet
            .write_string_with_format(0, column_index(col)?, name, &header)
            .map_err(xlsx_error)?;
    }

    let formats = CellFormats {
        number: Format::new().set_num_format("General"),
        date: Format::new().set_num_format(DATE_FORMAT),
        datetime: Format::new().set_num_format(DATETIME_FORMAT),
    };

    for (index, row) in result.rows.iter().enumerate() {
        let row_num = u32::try_from(index + 1)
            .map_err(|_| AppError::export("Too many rows for a worksheet"))?;
        for (col, value) in row.iter().enumerate() {
            write_cell(worksheet, row_num, column_index(col)?, value, &formats)
                .map_err(xlsx_error)?;
        }
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Value,
    formats: &CellFormats,
) -> std::result::Result<(), XlsxError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        Value::Int(i) => {
            worksheet.write_number_with_format(row, col, *i as f64, &formats.number)?;
        }
        Value::Float(f) if f.is_finite() => {
            worksheet.write_number_with_format(row, col, *f, &formats.number)?;
        }
        Value::Decimal(d) => match d.to_f64() {
            Some(number) => {
                worksheet.write_number_with_format(row, col, number, &formats.number)?;
            }
            None => {
                worksheet.write_string(row, col, value.to_text())?;
            }
        },
        Value::Date(d) => {
            worksheet.write_datetime_with_format(row, col, d, &formats.date)?;
        }
        Value::Timestamp(ts) => {
            worksheet.write_datetime_with_format(row, col, ts, &formats.datetime)?;
        }
        Value::TimestampTz(ts) => {
            worksheet.write_datetime_with_format(
                row,
                col,
                &ts.naive_utc(),
                &formats.datetime,
            )?;
        }
        other => {
            worksheet.write_string(row, col, other.to_text())?;
        }
    }
    Ok(())
}

fn column_index(col: usize) -> Result<u16> {
    u16::try_from(col).map_err(|_| AppError::export("Too many columns for a worksheet"))
}

fn xlsx_error(error: XlsxError) -> AppError {
    AppError::export(format!("Failed to write spreadsheet: {error}"))
}
