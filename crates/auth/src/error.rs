use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}
