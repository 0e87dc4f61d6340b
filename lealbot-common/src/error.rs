// ================================================================
// File: lealbot-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Uuid error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Event bus error: {0}")]
    EventBus(String),

    // Terminal authorization failure: the refresh token was rejected by the
    // platform (revoked, expired, or consumed). The credential is dead until
    // the operator re-authorizes.
    #[error("Refresh token expired or revoked: {0}")]
    RefreshTokenExpired(String),

    // Ledger precondition violations. Each of these aborts the enclosing
    // transaction with no rows written.
    #[error("Offer is not available")]
    OfferUnavailable,

    #[error("Offer is out of stock")]
    OutOfStock,

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: i64, available: i64 },

    #[error("User not found")]
    UserNotFound,

    #[error("Redemption already refunded")]
    AlreadyRefunded,

    #[error("Invalid redemption state: {0}")]
    InvalidState(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}
