//! Error types for the stevedore console

use thiserror::Error;

/// Main error type for the stevedore console
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Submit error: {0}")]
    SubmitError(String),

    #[error("Deploy error: {0}")]
    DeployError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Lifecycle error: {0}")]
    LifecycleError(String),

    #[error("A deployment is already in flight for this session")]
    DeployInFlight,

    #[error("Credentials error: {0}")]
    CredentialsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ConsoleError {
    fn from(err: anyhow::Error) -> Self {
        ConsoleError::Internal(err.to_string())
    }
}
