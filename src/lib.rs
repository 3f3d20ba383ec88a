//! db-query - read-only SQL access to Postgres and MySQL.
//!
//! The library exposes the validation, execution, metadata and export
//! pipelines used by the `dbq` binary and by integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod llm;
pub mod logging;
pub mod metadata;
pub mod persistence;
pub mod query;
pub mod safety;
pub mod service;
