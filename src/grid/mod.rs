//! Map grid ingestion

pub mod ingest;

pub use ingest::{ExtendedGrid, Grid, IngestWarning};
