//! Error types for the texture pipeline

use thiserror::Error;

/// Main error type for the pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Map text contained no data rows after header stripping.
    #[error("map is empty after parsing")]
    EmptyMap,

    /// Grid extension was requested without a resolved water token.
    #[error("no water token resolved for pole padding")]
    MissingWaterToken,

    /// The manifest document itself could not be fetched or parsed.
    /// Individual asset failures are absorbed by fallback instead.
    #[error("manifest fetch failed: {0}")]
    ManifestFetch(String),

    /// A required core texture has no usable source, neither compressed nor raw.
    #[error("no usable source for texture '{0}'")]
    Asset(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
