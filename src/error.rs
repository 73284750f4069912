use thiserror::Error;

/// Main error type for the fleet supervisor
#[derive(Error, Debug)]
pub enum FleetError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid account list: {0}")]
    AccountList(String),

    // Sandbox errors
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    // Process errors
    #[error("Process spawn error: {0}")]
    Spawn(String),

    #[error("Worker process exited: {0}")]
    ProcessExit(String),

    #[error("Worker already running for login {0}")]
    AlreadyRunning(i64),

    #[error("Unknown login: {0}")]
    UnknownLogin(i64),

    // Terminal session errors
    #[error("Terminal connection error: {0}")]
    Connection(String),

    // Bridge store errors
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Store corrupt: {0}")]
    CorruptStore(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for FleetError
pub type Result<T> = std::result::Result<T, FleetError>;
