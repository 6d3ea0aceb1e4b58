//! Order ingestion service with a Postgres store and a restart-safe lookup cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
