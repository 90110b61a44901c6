/// User lookups consumed by the auth flow.
///
/// Relational user storage belongs to the account service; identity-service only
/// reads users through [`UserDirectory`].
use crate::context::RequestContext;
use crate::error::Result;
use crate::models::User;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user by email (case-insensitive). `Ok(None)` when unknown.
    async fn get_by_email(&self, ctx: &RequestContext, email: &str) -> Result<Option<User>>;

    /// Look up a user by id. `Ok(None)` when unknown.
    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<Option<User>>;
}

/// In-process directory for tests and local development
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn remove(&self, id: Uuid) -> Option<User> {
        self.users.write().await.remove(&id)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_by_email(&self, _ctx: &RequestContext, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_by_id(&self, _ctx: &RequestContext, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}
