use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Store unavailable")]
    StoreUnavailable,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid key pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PulseError>;
