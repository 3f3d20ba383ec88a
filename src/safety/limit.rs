//! Row-ceiling injection.
//!
//! The ceiling is appended after the last significant token so that a
//! trailing semicolon or comment can never swallow it.

use sqlparser::dialect::Dialect;
use sqlparser::tokenizer::{Location, Token, Tokenizer};

use crate::error::{AppError, Result};

/// Appends ` LIMIT {ceiling}` after the statement's last significant token.
///
/// Trailing whitespace, comments and semicolons are dropped.
pub(super) fn append_limit(dialect: &dyn Dialect, sql: &str, ceiling: u64) -> Result<String> {
    let end = statement_end(dialect, sql)?;
    Ok(format!("{} LIMIT {}", &sql[..end], ceiling))
}

/// Byte offset just past the last token that is not trivia.
fn statement_end(dialect: &dyn Dialect, sql: &str) -> Result<usize> {
    let tokens = Tokenizer::new(dialect, sql)
        .tokenize_with_location()
        .map_err(|e| AppError::syntax(e.to_string()))?;

    let last_significant = tokens.iter().rposition(|t| !is_trivia(&t.token));
    let Some(last) = last_significant else {
        return Ok(0);
    };

    match tokens.get(last + 1) {
        Some(next) => Ok(byte_offset(sql, next.location)),
        None => Ok(sql.len()),
    }
}

fn is_trivia(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_) | Token::SemiColon | Token::EOF)
}

/// Converts a 1-based line/column location into a byte offset.
fn byte_offset(sql: &str, location: Location) -> usize {
    let (mut line, mut column) = (1u64, 1u64);
    for (offset, ch) in sql.char_indices() {
        if line == location.line && column == location.column {
            return offset;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    sql.len()
}
