//! Core pipeline systems: configuration, errors, logging

pub mod config;
pub mod error;
pub mod logging;

pub use config::PipelineConfig;
pub use error::{Error, Result};
