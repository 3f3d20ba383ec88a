//! Integration tests for db-query.

pub mod common;
pub mod connection_test;
pub mod export_test;
pub mod live_test;
pub mod metadata_test;
pub mod persistence_test;
pub mod query_test;
pub mod service_test;
