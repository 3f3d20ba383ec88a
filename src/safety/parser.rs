//! SQL parsing and read-only validation.
//!
//! Uses sqlparser-rs with the generic dialect so the same rules apply to
//! PostgreSQL and MySQL text. Every query in the tree is inspected: CTE
//! bodies, derived tables, and both sides of set operations.

use regex::Regex;
use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{AppError, Result};

use super::{limit, ValidatedQuery};

fn position_re() -> Option<&'static Regex> {
    static POSITION_RE: OnceLock<Option<Regex>> = OnceLock::new();
    POSITION_RE
        .get_or_init(|| Regex::new(r"Line: (\d+), Column: (\d+)").ok())
        .as_ref()
}

/// Validates SQL text and applies the row ceiling.
#[derive(Debug)]
pub struct QueryValidator {
    dialect: GenericDialect,
}

// `GenericDialect` is a stateless unit struct without a `Clone` impl.
impl Clone for QueryValidator {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryValidator {
    /// Creates a new validator.
    pub fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// Checks that `sql` is a single read-only query and injects
    /// `LIMIT {ceiling}` if its outermost query has no limit.
    ///
    /// An existing outer limit is never changed, whether smaller or larger
    /// than the ceiling.
    pub fn validate(&self, sql: &str, ceiling: u64) -> Result<ValidatedQuery> {
        if sql.trim().is_empty() {
            return Err(AppError::syntax("Empty SQL query"));
        }

        let statements = Parser::parse_sql(&self.dialect, sql).map_err(syntax_error)?;

        let query = match statements.as_slice() {
            [] => return Err(AppError::syntax("Empty SQL query")),
            [Statement::Query(query)] => query,
            [single] => return Err(AppError::forbidden(statement_verb(single))),
            many => {
                let verb = many
                    .iter()
                    .map(statement_verb)
                    .find(|verb| verb != "SELECT")
                    .unwrap_or_else(|| "MULTIPLE STATEMENTS".to_string());
                return Err(AppError::forbidden(verb));
            }
        };

        check_query(query)?;

        if query.limit.is_some() || query.fetch.is_some() {
            debug!("Query already has an outer limit; leaving it unchanged");
            return Ok(ValidatedQuery {
                original: sql.to_string(),
                rewritten: sql.to_string(),
                limit_injected: false,
            });
        }

        let rewritten = limit::append_limit(&self.dialect, sql, ceiling)?;
        debug!(ceiling, "Injected row ceiling");
        Ok(ValidatedQuery {
            original: sql.to_string(),
            rewritten,
            limit_injected: true,
        })
    }
}

/// Converts a parser error into a syntax error with the best-available position.
fn syntax_error(error: ParserError) -> AppError {
    let message = match error {
        ParserError::TokenizerError(message) | ParserError::ParserError(message) => message,
        ParserError::RecursionLimitExceeded => "Query is nested too deeply".to_string(),
    };

    let (line, column) = position_re()
        .and_then(|re| re.captures(&message))
        .map(|caps| (caps[1].parse().ok(), caps[2].parse().ok()))
        .unwrap_or((None, None));

    AppError::Syntax {
        message,
        line,
        column,
    }
}

/// Returns the leading keyword of a statement, upper-cased.
fn statement_verb(statement: &Statement) -> String {
    leading_keyword(&statement.to_string())
}

fn leading_keyword(text: &str) -> String {
    text.split_whitespace()
        .next()
        .map(|word| word.trim_matches('(').to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

/// Rejects any write or locking construct inside a query tree.
fn check_query(query: &Query) -> Result<()> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }

    if let Some(lock) = query.locks.first() {
        return Err(AppError::forbidden(format!("SELECT {lock}")));
    }

    check_set_expr(&query.body)
}

fn check_set_expr(set_expr: &SetExpr) -> Result<()> {
    match set_expr {
        SetExpr::Select(select) => check_select(select),
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(_) => Err(AppError::forbidden("VALUES")),
        SetExpr::Table(_) => Err(AppError::forbidden("TABLE")),
        // INSERT / UPDATE bodies, and any write form a newer parser adds.
        other => Err(AppError::forbidden(leading_keyword(&other.to_string()))),
    }
}

fn check_select(select: &Select) -> Result<()> {
    if select.into.is_some() {
        return Err(AppError::forbidden("SELECT INTO"));
    }

    for table_with_joins in &select.from {
        check_table_with_joins(table_with_joins)?;
    }
    Ok(())
}

fn check_table_with_joins(twj: &TableWithJoins) -> Result<()> {
    check_table_factor(&twj.relation)?;
    for join in &twj.joins {
        check_table_factor(&join.relation)?;
    }
    Ok(())
}

fn check_table_factor(factor: &TableFactor) -> Result<()> {
    match factor {
        TableFactor::Derived { subquery, .. } => check_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => check_table_with_joins(table_with_joins),
        _ => Ok(()),
    }
}
