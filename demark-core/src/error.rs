use thiserror::Error;

/// Custom error types for demark
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Required external tool not found: {0}")]
    DependencyNotFound(String),

    #[error("Failed to start command '{0}': {1}")]
    CommandStart(String, String),

    #[error("Command '{0}' failed: {1}")]
    CommandFailed(String, String),

    #[error("Failed to probe video: {0}")]
    Probe(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Restoration failed: {0}")]
    Restoration(String),

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Model download failed: {0}")]
    ModelDownload(String),

    #[error("Model integrity check failed: {0}")]
    ModelIntegrity(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for demark operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;
