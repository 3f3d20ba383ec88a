//! Query safety validation module.
//!
//! Parses SQL, rejects everything except a single read-only query, and
//! injects a row ceiling when the outermost query has no limit of its own.
//! Never touches a database connection.

mod limit;
mod parser;

pub use parser::QueryValidator;

use crate::error::Result;
use serde::Serialize;

/// Rows returned by a query that specifies no limit of its own.
pub const DEFAULT_ROW_CEILING: u64 = 1000;

/// Output of the safety pipeline for one SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedQuery {
    /// SQL text as submitted.
    pub original: String,
    /// SQL text to execute.
    pub rewritten: String,
    /// True when a `LIMIT` clause was appended.
    pub limit_injected: bool,
}

/// Validates `sql` with the given ceiling using a default validator.
pub fn validate(sql: &str, ceiling: u64) -> Result<ValidatedQuery> {
    QueryValidator::new().validate(sql, ceiling)
}
