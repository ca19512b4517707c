use thiserror::Error;

/// Domain errors for the credential and token layer.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username already registered")]
    DuplicateUsername,

    #[error("password does not meet security requirements: {0}")]
    WeakPassword(&'static str),

    #[error("could not validate credentials")]
    InvalidToken,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}
