use thiserror::Error;

/// Top-level error type for Almanac.
///
/// Subsystem crates define their own error types and implement
/// `From<AlmanacError>` so that the `?` operator works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AlmanacError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AlmanacError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        AlmanacError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<toml::de::Error> for AlmanacError {
    fn from(err: toml::de::Error) -> Self {
        AlmanacError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AlmanacError {
    fn from(err: toml::ser::Error) -> Self {
        AlmanacError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AlmanacError {
    fn from(err: serde_json::Error) -> Self {
        AlmanacError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Almanac operations.
pub type Result<T> = std::result::Result<T, AlmanacError>;
