//! Suggested export filenames.

use super::ExportFormat;
use chrono::{DateTime, Utc};

const MAX_NAME_LEN: usize = 200;

/// Keeps ASCII letters, digits, `_` and `-`, truncated to 200 characters.
///
/// Returns `export` when nothing survives.
pub fn sanitize_connection_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_NAME_LEN)
        .collect();

    if cleaned.is_empty() {
        "export".to_string()
    } else {
        cleaned
    }
}

/// Builds `{name}_{YYYYMMDDTHHMMSS}.{ext}` using the UTC time `at`.
pub fn build_filename(connection_name: &str, format: ExportFormat, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{}",
        sanitize_connection_name(connection_name),
        at.format("%Y%m%dT%H%M%S"),
        format.extension()
    )
}
