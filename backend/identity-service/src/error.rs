use crate::cache::StoreError;
use crypto_core::jwt::TokenError;
use http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad email/password, or a refresh token that failed resolution or
    /// device binding. Deliberately carries no detail.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// HTTP status the boundary layer should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            IdentityError::Validation(_) => StatusCode::BAD_REQUEST,
            IdentityError::InvalidCredentials
            | IdentityError::InvalidToken
            | IdentityError::TokenExpired => StatusCode::UNAUTHORIZED,
            IdentityError::Store(StoreError::DeadlineExceeded | StoreError::Cancelled) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            IdentityError::Signing(_)
            | IdentityError::Store(_)
            | IdentityError::Database(_)
            | IdentityError::Config(_)
            | IdentityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients
    pub fn public_message(&self) -> String {
        match self {
            IdentityError::Validation(msg) => format!("Validation error: {}", msg),
            IdentityError::InvalidCredentials => "Invalid credentials".to_string(),
            IdentityError::InvalidToken | IdentityError::TokenExpired => {
                "Invalid or expired token".to_string()
            }
            IdentityError::Store(StoreError::DeadlineExceeded | StoreError::Cancelled) => {
                "Service temporarily unavailable".to_string()
            }
            // Don't leak internal details in production
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<TokenError> for IdentityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => IdentityError::TokenExpired,
            TokenError::Malformed | TokenError::InvalidSignature => IdentityError::InvalidToken,
            TokenError::Signing(msg) | TokenError::Key(msg) => {
                tracing::error!("Token signing error: {}", msg);
                IdentityError::Signing(msg)
            }
        }
    }
}

impl From<validator::ValidationErrors> for IdentityError {
    fn from(err: validator::ValidationErrors) -> Self {
        IdentityError::Validation(err.to_string())
    }
}
