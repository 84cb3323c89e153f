use std::path::PathBuf;

/// Shared error type used across all PairBridge crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed phone number or user id. User-correctable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Role, entitlement, or rate-limit failure.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("no active session for {0}")]
    NoActiveSession(String),

    #[error("storage ({}): {message}", path.display())]
    Storage { path: PathBuf, message: String },

    #[error("network {phone}: {message}")]
    Network { phone: String, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Error::Storage {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn network(phone: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Error::Network {
            phone: phone.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether the error is something the caller can fix by changing input
    /// or permissions (as opposed to an infrastructure failure).
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::Unauthorized(_) | Error::NoActiveSession(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
