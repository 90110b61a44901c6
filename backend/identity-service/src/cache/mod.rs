/// Refresh-session storage
///
/// Three kinds of entries make up the store:
///
/// - **Session record** `{prefix}:session:<id>`: JSON `RefreshSession`, expires with the refresh TTL
/// - **Session index** `{prefix}:session-index:<user_id>`: set of live session ids, no TTL
/// - **Reverse lookup** `{prefix}:refresh-fingerprint:<digest>`: fingerprint to session id,
///   expires with the refresh TTL
///
/// A reverse lookup never outlives its record: every path that deletes a record
/// deletes the lookup in the same atomic step.
use crate::context::RequestContext;
use crate::models::RefreshSession;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod memory_store;
pub mod redis_store;

pub use memory_store::InMemorySessionStore;
pub use redis_store::RedisSessionStore;

pub const DEFAULT_KEY_PREFIX: &str = "nova:auth";

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session backend error: {0}")]
    Backend(String),

    #[error("Session serialization error: {0}")]
    Serialization(String),

    #[error("Session store deadline exceeded")]
    DeadlineExceeded,

    #[error("Request cancelled")]
    Cancelled,
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StoreError::DeadlineExceeded
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Key builder for one deployment's namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    prefix: String,
}

impl SessionKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches(':').to_string();
        Self { prefix }
    }

    pub fn session(&self, session_id: &str) -> String {
        format!("{}{}", self.session_prefix(), session_id)
    }

    pub fn index(&self, user_id: Uuid) -> String {
        format!("{}:session-index:{}", self.prefix, user_id)
    }

    pub fn fingerprint(&self, digest: &str) -> String {
        format!("{}{}", self.fingerprint_prefix(), digest)
    }

    pub(crate) fn session_prefix(&self) -> String {
        format!("{}:session:", self.prefix)
    }

    pub(crate) fn fingerprint_prefix(&self) -> String {
        format!("{}:refresh-fingerprint:", self.prefix)
    }
}

impl Default for SessionKeys {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

/// Redis `EX` takes whole seconds; sub-second TTLs round up to one.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Session persistence used by `AuthFlow`.
///
/// Every call is bounded by the request's deadline and cancellation signal.
/// `None` from a getter means the entry does not exist (or has expired).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write the record and its index entry atomically
    async fn save_session(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
        ttl: Duration,
    ) -> StoreResult<()>;

    async fn get_session(
        &self,
        ctx: &RequestContext,
        session_id: &str,
    ) -> StoreResult<Option<RefreshSession>>;

    /// Remove the record and its index entry atomically
    async fn delete_session(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        session_id: &str,
    ) -> StoreResult<()>;

    /// Remove every session of `user_id` together with their reverse lookups
    /// and the index itself. Returns how many live records were removed.
    async fn delete_all_user_sessions(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
    ) -> StoreResult<usize>;

    async fn set_refresh_token_id(
        &self,
        ctx: &RequestContext,
        fingerprint: &str,
        session_id: &str,
        ttl: Duration,
    ) -> StoreResult<()>;

    async fn get_refresh_token_id(
        &self,
        ctx: &RequestContext,
        fingerprint: &str,
    ) -> StoreResult<Option<String>>;

    async fn delete_refresh_token_id(
        &self,
        ctx: &RequestContext,
        fingerprint: &str,
    ) -> StoreResult<()>;

    /// Record, index entry and reverse lookup in one step
    async fn create_session(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
        ttl: Duration,
    ) -> StoreResult<()>;

    /// Replace `old` with `new` only if `old` is still the session its
    /// fingerprint resolves to. `false` means another caller got there first
    /// (or the session is gone) and nothing was written.
    async fn rotate_session(
        &self,
        ctx: &RequestContext,
        old: &RefreshSession,
        new: &RefreshSession,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Delete record, reverse lookup and index entry under the same guard as
    /// `rotate_session`.
    async fn revoke_session(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
    ) -> StoreResult<bool>;
}
