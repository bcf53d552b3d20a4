use thiserror::Error;

/// Top-level error type for the knowledge base.
///
/// Subsystem crates convert their own failures (HTTP transport, CSV and
/// spreadsheet parsing) into one of these variants so that the `?`
/// operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector engine error: {0}")]
    Engine(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for KbError {
    fn from(err: toml::de::Error) -> Self {
        KbError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for KbError {
    fn from(err: toml::ser::Error) -> Self {
        KbError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for KbError {
    fn from(err: serde_json::Error) -> Self {
        KbError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for knowledge base operations.
pub type Result<T> = std::result::Result<T, KbError>;
