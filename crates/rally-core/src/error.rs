use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures that block the operation that raised them.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Deliberately carries no detail about which check failed.
    #[error("invalid credentials")]
    Unauthorized,

    #[error("invalid input: {0}")]
    Validation(String),

    /// Hashing or token signing failed.
    #[error("credential processing failed: {0}")]
    Crypto(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Token validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token expired")]
    Expired,

    #[error("invalid token")]
    Invalid,
}
