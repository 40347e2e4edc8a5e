/// Result type alias for mining operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the pattern mining engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The recorder or pattern database could not be reached.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Expected tables or columns are missing from the recorder schema.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A database query exceeded the per-query timeout.
    #[error("Storage timeout after {0} seconds")]
    StorageTimeout(u64),

    /// No state changes found in the requested time range.
    #[error("No events in range")]
    EmptyInput,

    /// A stored attribute blob could not be parsed.
    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is recoverable (the engine may retry once)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::StorageUnavailable(_) | Error::StorageTimeout(_) | Error::Io(_) => true,
            Error::SchemaMismatch(_)
            | Error::EmptyInput
            | Error::Malformed(_)
            | Error::InvalidInput(_)
            | Error::Configuration(_)
            | Error::Serialization(_)
            | Error::Yaml(_) => false,
        }
    }
}
