pub mod retry;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LikeBridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Duplicate operation: {0}")]
    Conflict(String),

    #[error("System busy: {0}")]
    SystemBusy(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Delivery failure: {0}")]
    Delivery(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Coarse classification of an error, used by callers to decide between
/// surfacing, retrying and compensating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or missing ids. Surfaced immediately, never retried.
    Parameter,
    /// Duplicate like/unlike. A business rule violation.
    Conflict,
    /// Lock timeout or an unavailable store/broker. Safe to retry.
    Transient,
    /// Publish or acknowledge failure. Local optimistic writes are rolled back.
    Delivery,
    /// Everything else.
    Fatal,
}

impl LikeBridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LikeBridgeError::InvalidParameter(_) => ErrorKind::Parameter,
            LikeBridgeError::Conflict(_) => ErrorKind::Conflict,
            LikeBridgeError::SystemBusy(_)
            | LikeBridgeError::Redis(_)
            | LikeBridgeError::Database(_)
            | LikeBridgeError::Broker(_)
            | LikeBridgeError::Io(_) => ErrorKind::Transient,
            LikeBridgeError::Delivery(_) => ErrorKind::Delivery,
            _ => ErrorKind::Fatal,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<redis::RedisError> for LikeBridgeError {
    fn from(err: redis::RedisError) -> Self {
        LikeBridgeError::Redis(err.to_string())
    }
}

impl From<tokio_postgres::Error> for LikeBridgeError {
    fn from(err: tokio_postgres::Error) -> Self {
        LikeBridgeError::Database(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for LikeBridgeError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        LikeBridgeError::Database(format!("Failed to get connection from pool: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, LikeBridgeError>;
