//! Database abstraction layer for db-query.
//!
//! Provides a trait-based interface over the two supported dialects. A
//! [`Connector`] opens a fresh [`DatabaseClient`] handle for every unit of
//! work; no connection state is shared between requests.

mod decode;
mod mock;
mod mysql;
mod postgres;
mod schema;
mod types;

pub use mock::{FailingConnector, MockConnector, MockDatabaseClient};
pub use mysql::{map_mysql_type, MySqlClient};
pub use postgres::{map_postgres_type, PostgresClient};
pub use schema::{
    CanonicalColumn, CanonicalTable, MetadataSnapshot, RawColumn, TableKind, TableRef,
};
pub use types::{CanonicalType, ColumnInfo, QueryResult, Row, Value};

use crate::error::{AppError, ConnectionErrorKind, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default time allowed for opening a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Supported database dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    MySql,
}

impl Dialect {
    /// Returns the dialect as a string for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }

    /// Returns a human-readable engine name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
        }
    }

    /// Parses a dialect from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" => Some(Self::MySql),
            _ => None,
        }
    }

    /// Detects the dialect from a connection string's scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = parse_url(url)?;
        Self::url_schemes_all()
            .find(|(_, scheme)| *scheme == parsed.scheme())
            .map(|(dialect, _)| dialect)
            .ok_or_else(|| {
                AppError::connection(
                    ConnectionErrorKind::MalformedUrl,
                    format!(
                        "Unsupported scheme '{}'. Expected postgres://, postgresql:// or mysql://",
                        parsed.scheme()
                    ),
                )
            })
    }

    fn url_schemes_all() -> impl Iterator<Item = (Dialect, &'static str)> {
        [Self::Postgres, Self::MySql]
            .into_iter()
            .flat_map(|d| d.url_schemes().iter().map(move |s| (d, *s)))
    }

    /// Accepted URL schemes for this dialect.
    pub fn url_schemes(&self) -> &'static [&'static str] {
        match self {
            Self::Postgres => &["postgres", "postgresql"],
            Self::MySql => &["mysql"],
        }
    }

    /// Returns the default port for this dialect.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::MySql => 3306,
        }
    }

    /// Schemas excluded from catalog listings.
    pub fn system_schemas(&self) -> &'static [&'static str] {
        match self {
            Self::Postgres => &["pg_catalog", "information_schema"],
            Self::MySql => &["mysql", "information_schema", "performance_schema", "sys"],
        }
    }

    /// Maps a native type name to its canonical tag. Unknown names map to `Other`.
    pub fn map_native_type(&self, native_type: &str) -> CanonicalType {
        match self {
            Self::Postgres => map_postgres_type(native_type),
            Self::MySql => map_mysql_type(native_type),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one database: logical name, dialect and connection string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub name: String,
    pub dialect: Dialect,
    pub url: String,
}

impl ConnectionDescriptor {
    pub fn new(name: impl Into<String>, dialect: Dialect, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dialect,
            url: url.into(),
        }
    }

    /// Builds a descriptor whose dialect is taken from the URL scheme.
    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let dialect = Dialect::from_url(&url)?;
        Ok(Self::new(name, dialect, url))
    }

    /// Parses the connection string and checks its scheme against the dialect.
    ///
    /// Never touches the network.
    pub fn validate_url(&self) -> Result<Url> {
        let parsed = parse_url(&self.url)?;
        if !self.dialect.url_schemes().contains(&parsed.scheme()) {
            return Err(AppError::connection(
                ConnectionErrorKind::MalformedUrl,
                format!(
                    "Invalid scheme '{}' for {}. Expected {}://",
                    parsed.scheme(),
                    self.dialect.display_name(),
                    self.dialect.url_schemes().join(":// or ")
                ),
            ));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(AppError::connection(
                ConnectionErrorKind::MalformedUrl,
                "Connection string has no host",
            ));
        }
        Ok(parsed)
    }

    /// Returns the connection string with any password masked.
    pub fn redacted_url(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            Ok(url) => url.to_string(),
            Err(_) => "<invalid url>".to_string(),
        }
    }

    /// Returns a display-safe summary (no credentials).
    pub fn display_string(&self) -> String {
        match Url::parse(&self.url) {
            Ok(url) => format!(
                "{} @ {}:{} ({})",
                url.path().trim_start_matches('/'),
                url.host_str().unwrap_or("localhost"),
                url.port().unwrap_or_else(|| self.dialect.default_port()),
                self.dialect.display_name()
            ),
            Err(_) => format!("{} ({})", self.name, self.dialect.display_name()),
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("url", &self.redacted_url())
            .finish()
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| {
        AppError::connection(
            ConnectionErrorKind::MalformedUrl,
            format!("Invalid connection string: {e}"),
        )
    })
}

/// Trait defining the interface for an open database handle.
///
/// All catalog listings exclude the dialect's system schemas.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// The dialect this handle speaks.
    fn dialect(&self) -> Dialect;

    /// Lists user tables and views as `(schema, name, kind)`.
    async fn list_tables(&self) -> Result<Vec<TableRef>>;

    /// Lists a table's columns ordered by ordinal position.
    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<RawColumn>>;

    /// Best-effort row estimate; `None` is a valid result.
    async fn approximate_row_count(&self, schema: &str, table: &str) -> Result<Option<i64>>;

    /// Runs exactly the given SQL text and returns its rows.
    async fn execute(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the connection.
    async fn close(&self) -> Result<()>;
}

/// Opens database handles from descriptors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new handle, failing with a connection error on any problem.
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn DatabaseClient>>;
}

/// Opens real driver connections, one per call, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct DriverConnector {
    connect_timeout: Duration,
}

impl DriverConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for DriverConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for DriverConnector {
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn DatabaseClient>> {
        let url = descriptor.validate_url()?;
        debug!(
            connection = %descriptor.name,
            dialect = %descriptor.dialect,
            "Opening connection"
        );

        let connect = async {
            let client: Box<dyn DatabaseClient> = match descriptor.dialect {
                Dialect::Postgres => Box::new(PostgresClient::connect(&url).await?),
                Dialect::MySql => Box::new(MySqlClient::connect(&url).await?),
            };
            Ok(client)
        };

        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(result) => result,
            Err(_) => {
                warn!(connection = %descriptor.name, "Connection attempt timed out");
                Err(AppError::connection(
                    ConnectionErrorKind::HostUnreachable,
                    format!(
                        "Connection to {}:{} timed out after {}s",
                        url.host_str().unwrap_or("localhost"),
                        url.port().unwrap_or_else(|| descriptor.dialect.default_port()),
                        self.connect_timeout.as_secs_f32()
                    ),
                ))
            }
        }
    }
}

/// Opens and immediately closes a connection to verify the descriptor.
pub async fn test_connection(
    connector: &dyn Connector,
    descriptor: &ConnectionDescriptor,
) -> Result<()> {
    let client = connector.open(descriptor).await?;
    client.close().await
}

/// Classifies a driver error by its type and message text.
///
/// Used when the server did not supply a recognizable error code.
pub(crate) fn classify_connection_error(error: &sqlx::Error) -> ConnectionErrorKind {
    match error {
        sqlx::Error::Configuration(_) => return ConnectionErrorKind::MalformedUrl,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
            return ConnectionErrorKind::HostUnreachable
        }
        _ => {}
    }

    let error_str = error.to_string().to_lowercase();
    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("access denied")
    {
        ConnectionErrorKind::AuthenticationRejected
    } else if (error_str.contains("does not exist") && error_str.contains("database"))
        || error_str.contains("unknown database")
    {
        ConnectionErrorKind::DatabaseMissing
    } else {
        ConnectionErrorKind::HostUnreachable
    }
}

/// Builds a user-facing connection error message for the given kind.
pub(crate) fn connection_error_message(
    kind: ConnectionErrorKind,
    url: &Url,
    dialect: Dialect,
    error: &sqlx::Error,
) -> String {
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or_else(|| dialect.default_port());
    let user = if url.username().is_empty() {
        "unknown"
    } else {
        url.username()
    };
    let database = url.path().trim_start_matches('/');

    match kind {
        ConnectionErrorKind::HostUnreachable => {
            format!("Cannot connect to {host}:{port}. Check that the server is running. ({error})")
        }
        ConnectionErrorKind::AuthenticationRejected => {
            format!("Authentication failed for user '{user}'. Check your credentials.")
        }
        ConnectionErrorKind::DatabaseMissing => {
            format!("Database '{database}' does not exist.")
        }
        ConnectionErrorKind::MalformedUrl => format!("Invalid connection string: {error}"),
    }
}

/// Error returned when a handle is used after `close`.
pub(crate) fn closed_handle_error() -> AppError {
    AppError::internal("Database handle used after close")
}
