//! Application services: order lookups and ingestion.

pub mod error;
pub mod ingest;
pub mod orders;
pub mod repos;

#[cfg(test)]
pub(crate) mod fakes;
