//! Request and response shapes at the service boundary.
//!
//! These mirror the HTTP surface owned by the gateway:
//! `POST /login`, `POST /refresh`, `POST /logout`, `POST /logout-all`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::user::Role;

/// User login request
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, max = 8192))]
    pub access_token: String,
    #[validate(length(min = 1, max = 8192))]
    pub refresh_token: String,
}

/// Logout / logout-all request
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LogoutRequest {
    #[validate(length(min = 1, max = 8192))]
    pub refresh_token: String,
}

/// Token pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

impl TokenPair {
    pub fn bearer(access_token: String, refresh_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Caller identity established from a verified access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: Option<Role>,
}
