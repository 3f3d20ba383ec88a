//! dbq - read-only SQL access to Postgres and MySQL.

mod cli;

use std::path::Path;
use std::sync::Arc;

use cli::{Cli, Command, ConnectionsCommand, ExportArgs};
use db_query::config::Config;
use db_query::db::{self, ConnectionDescriptor, Connector, DriverConnector};
use db_query::error::{AppError, ErrorResponse, Result};
use db_query::export::ExportFormat;
use db_query::llm::create_sql_generator;
use db_query::logging;
use db_query::persistence::{ConnectionSummary, StateDb};
use db_query::query::QueryResultSet;
use db_query::service::{ExportSource, QueryService};
use serde::Serialize;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        if let Err(print_err) = print_json(&ErrorResponse::from(&e)) {
            eprintln!("{print_err}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load(&config_path)?;

    let state = StateDb::open(&config.state_db_path()).await?;
    let result = dispatch(cli.command, &config, &state).await;
    state.close().await;
    result
}

async fn dispatch(command: Command, config: &Config, state: &StateDb) -> Result<()> {
    let connector: Arc<dyn Connector> =
        Arc::new(DriverConnector::new(config.limits.connect_timeout()));

    match command {
        Command::Connections(command) => connections(command, connector, state).await,
        Command::Metadata {
            connection,
            refresh,
        } => {
            let service = build_service(connector, config, state);
            print_json(&service.metadata(&connection, refresh).await?)
        }
        Command::Query { connection, sql } => {
            let service = build_service(connector, config, state);
            print_json(&service.query(&connection, &sql).await?)
        }
        Command::Export(args) => {
            let service = build_service(connector, config, state);
            export(&service, args).await
        }
        Command::Ask { connection, prompt } => {
            let generator = create_sql_generator(&config.llm)?;
            let service = build_service(connector, config, state).with_generator(generator);
            print_json(
                &service
                    .natural_language(&connection, &prompt.join(" "))
                    .await?,
            )
        }
    }
}

fn build_service(connector: Arc<dyn Connector>, config: &Config, state: &StateDb) -> QueryService {
    QueryService::new(
        Arc::new(state.connections()),
        connector,
        Arc::new(state.metadata_cache()),
    )
    .with_limits(&config.limits)
}

async fn connections(
    command: ConnectionsCommand,
    connector: Arc<dyn Connector>,
    state: &StateDb,
) -> Result<()> {
    let store = state.connections();

    match command {
        ConnectionsCommand::Add { name, url, no_test } => {
            let descriptor = ConnectionDescriptor::from_url(name.trim(), url.as_str())?;
            descriptor.validate_url()?;
            if !no_test {
                db::test_connection(connector.as_ref(), &descriptor).await?;
            }
            let stored = store.add(&name, &url).await?;
            info!("Registered connection {}", stored.name);
            print_json(&stored.summary())
        }
        ConnectionsCommand::List => {
            let summaries: Vec<ConnectionSummary> =
                store.list().await?.iter().map(|c| c.summary()).collect();
            print_json(&summaries)
        }
        ConnectionsCommand::Remove { name } => {
            store.remove(&name).await?;
            print_json(&serde_json::json!({ "removed": name }))
        }
        ConnectionsCommand::Test { name } => {
            let service =
                QueryService::new(Arc::new(store), connector, Arc::new(state.metadata_cache()));
            let descriptor = service.test_connection(&name).await?;
            print_json(&serde_json::json!({
                "name": descriptor.name,
                "dialect": descriptor.dialect,
                "url": descriptor.redacted_url(),
                "ok": true,
            }))
        }
    }
}

async fn export(service: &QueryService, args: ExportArgs) -> Result<()> {
    let format: ExportFormat = args.format.parse()?;

    let source = match (args.sql, args.input) {
        (Some(sql), _) => ExportSource::Sql(sql),
        (None, Some(path)) => ExportSource::ResultSet(read_result_set(&path)?),
        (None, None) => return Err(AppError::config("Either --sql or --input is required")),
    };

    let output = service.export(&args.connection, source, format).await?;

    std::fs::create_dir_all(&args.out_dir).map_err(|e| {
        AppError::export(format!(
            "Failed to create output directory {}: {e}",
            args.out_dir.display()
        ))
    })?;
    let path = args.out_dir.join(&output.filename);
    std::fs::write(&path, &output.bytes)
        .map_err(|e| AppError::export(format!("Failed to write {}: {e}", path.display())))?;

    print_json(&ExportReport {
        path: path.display().to_string(),
        filename: output.filename,
        mime_type: output.mime_type,
        bytes: output.bytes.len(),
    })
}

fn read_result_set(path: &Path) -> Result<QueryResultSet> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::export(format!("Failed to read {}: {e}", path.display())))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| AppError::export(format!("Invalid result set JSON: {e}")))?;
    QueryResultSet::from_json(&value)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportReport {
    path: String,
    filename: String,
    mime_type: &'static str,
    bytes: usize,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::internal(format!("Failed to encode output: {e}")))?;
    println!("{json}");
    Ok(())
}
