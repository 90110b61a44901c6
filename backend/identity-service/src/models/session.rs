use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client attributes a session is bound to at creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Server-side record behind one refresh token.
///
/// Written once at login or rotation and never updated; rotation replaces the
/// record with a new one under a new session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSession {
    pub session_id: String,
    pub user_id: Uuid,
    /// SHA-256 hex digest of the plaintext refresh token
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub client_ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

impl RefreshSession {
    /// `None` when `ttl` pushes the expiry past what `DateTime<Utc>` can hold
    pub fn new(
        session_id: String,
        user_id: Uuid,
        token_hash: String,
        ttl: chrono::Duration,
        client: &ClientInfo,
    ) -> Option<Self> {
        let now = Utc::now();
        Some(Self {
            session_id,
            user_id,
            token_hash,
            expires_at: now.checked_add_signed(ttl)?,
            client_ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            created_at: now,
        })
    }

    /// Expired sessions are invalid even before the store purges them
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}
