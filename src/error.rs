//! Error types for db-query.
//!
//! Defines the main error enum used throughout the crate and the
//! serializable shape it takes at the request boundary.

use serde::Serialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Why a database connection could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionErrorKind {
    /// The connection string could not be parsed or has the wrong scheme.
    MalformedUrl,
    /// The server refused the supplied credentials.
    AuthenticationRejected,
    /// The host could not be reached (refused, DNS failure, timeout).
    HostUnreachable,
    /// The server is reachable but the database does not exist.
    DatabaseMissing,
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedUrl => write!(f, "malformed URL"),
            Self::AuthenticationRejected => write!(f, "authentication rejected"),
            Self::HostUnreachable => write!(f, "host unreachable"),
            Self::DatabaseMissing => write!(f, "database missing"),
        }
    }
}

/// Main error type for db-query operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database connection errors.
    #[error("Connection error ({kind}): {message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    /// Catalog extraction failed; any cached snapshot is left untouched.
    #[error("Metadata extraction error: {0}")]
    MetadataExtraction(String),

    /// The SQL text could not be parsed.
    #[error("Syntax error: {message}")]
    Syntax {
        message: String,
        line: Option<u64>,
        column: Option<u64>,
    },

    /// The SQL text is not a single read-only SELECT.
    #[error("Only SELECT queries are allowed (found {verb})")]
    ForbiddenStatement { verb: String },

    /// The engine rejected the query; carries the native message verbatim.
    #[error("Execution error: {message}")]
    Execution {
        message: String,
        diagnostics: EngineDiagnostics,
    },

    /// The result set exceeds the export ceiling.
    #[error("Export limited to {limit} rows, result has {actual} rows")]
    ExportTooLarge { limit: usize, actual: usize },

    /// The requested export format is not one of csv, json, excel.
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// A value could not be serialized into the target format.
    #[error("Export error: {0}")]
    Export(String),

    /// A named connection does not exist in the store.
    #[error("Not found: {0}")]
    NotFound(String),

    /// LLM API errors (rate limits, auth, timeouts, unparseable output).
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (invalid config file, bad values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// State database errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Creates a connection error of the given kind.
    pub fn connection(kind: ConnectionErrorKind, msg: impl Into<String>) -> Self {
        Self::Connection {
            kind,
            message: msg.into(),
        }
    }

    /// Creates a metadata extraction error with the given message.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::MetadataExtraction(msg.into())
    }

    /// Creates a syntax error without position information.
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax {
            message: msg.into(),
            line: None,
            column: None,
        }
    }

    /// Creates a forbidden-statement error naming the offending verb.
    pub fn forbidden(verb: impl Into<String>) -> Self {
        Self::ForbiddenStatement { verb: verb.into() }
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::execution_with(msg, EngineDiagnostics::default())
    }

    /// Creates an execution error carrying the engine's own diagnostics.
    pub fn execution_with(msg: impl Into<String>, diagnostics: EngineDiagnostics) -> Self {
        Self::Execution {
            message: msg.into(),
            diagnostics,
        }
    }

    /// Creates an export serialization error with the given message.
    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "Connection Error",
            Self::MetadataExtraction(_) => "Metadata Error",
            Self::Syntax { .. } => "Syntax Error",
            Self::ForbiddenStatement { .. } => "Forbidden Statement",
            Self::Execution { .. } => "Execution Error",
            Self::ExportTooLarge { .. } => "Export Too Large",
            Self::UnsupportedFormat(_) => "Unsupported Format",
            Self::Export(_) => "Export Error",
            Self::NotFound(_) => "Not Found",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns a stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::MetadataExtraction(_) => "METADATA_EXTRACTION_ERROR",
            Self::Syntax { .. } => "SQL_SYNTAX_ERROR",
            Self::ForbiddenStatement { .. } => "FORBIDDEN_STATEMENT",
            Self::Execution { .. } => "EXECUTION_ERROR",
            Self::ExportTooLarge { .. } => "EXPORT_TOO_LARGE",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::Export(_) => "EXPORT_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Llm(_) => "LLM_ERROR",
            Self::Config(_) => "CONFIGURATION_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns kind-specific context for the boundary layer, if any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Connection { kind, .. } => Some(json!({ "kind": kind })),
            Self::Syntax { line, column, .. } => Some(json!({ "line": line, "column": column })),
            Self::ForbiddenStatement { verb } => Some(json!({ "statementType": verb })),
            Self::ExportTooLarge { limit, actual } => {
                Some(json!({ "limit": limit, "actual": actual }))
            }
            Self::Execution { diagnostics, .. } if !diagnostics.is_empty() => {
                serde_json::to_value(diagnostics).ok()
            }
            Self::UnsupportedFormat(format) => Some(json!({
                "format": format,
                "supported": ["csv", "json", "excel"],
            })),
            _ => None,
        }
    }

    /// Returns true if retrying with different input can succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::Persistence(_))
    }
}

/// Extra context the engine attached to a failed statement.
///
/// The error message itself stays exactly as the server sent it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDiagnostics {
    /// SQLSTATE (Postgres) or error number (MySQL).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl EngineDiagnostics {
    pub fn is_empty(&self) -> bool {
        self.native_code.is_none() && self.detail.is_none() && self.hint.is_none()
    }
}

/// Serializable error shape handed to the request boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub message: String,
    /// Stable error code.
    pub code: &'static str,
    /// Kind-specific context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            message: error.to_string(),
            code: error.code(),
            details: error.details(),
        }
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;
