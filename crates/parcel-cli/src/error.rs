//! Error types for parcel-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] parcel_core::Error),

    #[error(transparent)]
    Fs(#[from] parcel_fs::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }
}
