//! Command-line argument parsing for dbq.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use db_query::config::Config;

/// Read-only SQL access to Postgres and MySQL databases.
#[derive(Parser, Debug)]
#[command(name = "dbq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage registered connections
    #[command(subcommand)]
    Connections(ConnectionsCommand),

    /// Print the schema metadata of a connection
    Metadata {
        /// Connection name
        connection: String,

        /// Re-read the catalog instead of using the cached snapshot
        #[arg(long)]
        refresh: bool,
    },

    /// Run a read-only SQL query
    Query {
        /// Connection name
        connection: String,

        /// SQL text
        sql: String,
    },

    /// Export a query result to a file
    Export(ExportArgs),

    /// Ask a question in natural language
    Ask {
        /// Connection name
        connection: String,

        /// The question
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConnectionsCommand {
    /// Register a connection
    Add {
        /// Connection name
        name: String,

        /// postgres://, postgresql:// or mysql:// URL
        url: String,

        /// Save without opening a test connection
        #[arg(long)]
        no_test: bool,
    },

    /// List registered connections
    List,

    /// Remove a connection and its cached metadata
    Remove {
        /// Connection name
        name: String,
    },

    /// Open and close a connection to check it works
    Test {
        /// Connection name
        name: String,
    },
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Connection name; also used for the output filename
    pub connection: String,

    /// SQL to run and export
    #[arg(long, conflicts_with = "input", required_unless_present = "input")]
    pub sql: Option<String>,

    /// JSON result set to export instead of running SQL
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// csv, json or excel
    #[arg(short, long, default_value = "csv")]
    pub format: String,

    /// Directory the file is written to
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out_dir: PathBuf,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }
}
