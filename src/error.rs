use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("gone")]
    Gone,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("bundle too large: {size} bytes (limit {limit})")]
    BundleTooLarge { size: u64, limit: u64 },

    #[error("embedding failed: {0}")]
    EmbeddingUnavailable(String),

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token revoked")]
    TokenRevoked,

    #[error("token lookup collision")]
    TokenLookupCollision,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
