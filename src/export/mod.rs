//! Result set export.
//!
//! Serializes a [`QueryResultSet`] into CSV, pretty-printed JSON or an
//! XLSX workbook. An export is all-or-nothing: any cell that cannot be
//! written fails the whole export.

mod csv;
mod excel;
mod json;
mod naming;

pub use naming::{build_filename, sanitize_connection_name};

use crate::error::{AppError, Result};
use crate::query::{disambiguate_column_names, QueryResultSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Rows an export may contain.
pub const DEFAULT_EXPORT_ROW_LIMIT: usize = 100_000;

/// Supported export file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Excel,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Excel => "excel",
        }
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Excel => "xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json; charset=utf-8",
            Self::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "excel" | "xlsx" => Ok(Self::Excel),
            _ => Err(AppError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// A finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutput {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub filename: String,
}

/// Export engine with a fixed row limit.
#[derive(Debug, Clone, Copy)]
pub struct ExportEngine {
    row_limit: usize,
}

impl Default for ExportEngine {
    fn default() -> Self {
        Self::new(DEFAULT_EXPORT_ROW_LIMIT)
    }
}

impl ExportEngine {
    pub fn new(row_limit: usize) -> Self {
        Self { row_limit }
    }

    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    /// Serializes `result` into `format`.
    ///
    /// The row limit is checked before any serialization work. The
    /// suggested filename is derived from `connection_name`.
    pub fn export(
        &self,
        result: &QueryResultSet,
        format: ExportFormat,
        connection_name: &str,
    ) -> Result<ExportOutput> {
        let actual = result.row_count();
        if actual > self.row_limit {
            return Err(AppError::ExportTooLarge {
                limit: self.row_limit,
                actual,
            });
        }

        let names = disambiguate_column_names(&result.column_names());
        let bytes = match format {
            ExportFormat::Csv => csv::write(&names, result)?,
            ExportFormat::Json => json::write(&names, result)?,
            ExportFormat::Excel => excel::write(&names, result)?,
        };

        let filename = build_filename(connection_name, format, chrono::Utc::now());
        info!(
            format = %format,
            rows = actual,
            bytes = bytes.len(),
            filename = %filename,
            "Export generated"
        );

        Ok(ExportOutput {
            bytes,
            mime_type: format.mime_type(),
            filename,
        })
    }
}
