/// In-process `SessionStore` for tests and local development.
///
/// One mutex guards all three maps, so every compound operation is atomic with
/// respect to every other. TTLs are enforced lazily on read, and
/// `create_session` prunes expired ids from the user's index.
use super::{SessionStore, StoreError, StoreResult};
use crate::context::RequestContext;
use crate::models::RefreshSession;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    /// `None` when the TTL reaches past what the clock can represent
    expires_at: Option<Instant>,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, Expiring<RefreshSession>>,
    indexes: HashMap<Uuid, HashSet<String>>,
    fingerprints: HashMap<String, Expiring<String>>,
}

impl Inner {
    fn session(&mut self, session_id: &str) -> Option<&RefreshSession> {
        if !self.sessions.get(session_id)?.is_live() {
            self.sessions.remove(session_id);
            return None;
        }
        self.sessions.get(session_id).map(|entry| &entry.value)
    }

    fn lookup(&mut self, fingerprint: &str) -> Option<&str> {
        if !self.fingerprints.get(fingerprint)?.is_live() {
            self.fingerprints.remove(fingerprint);
            return None;
        }
        self.fingerprints
            .get(fingerprint)
            .map(|entry| entry.value.as_str())
    }

    fn insert(&mut self, session: &RefreshSession, ttl: Duration) {
        self.sessions.insert(
            session.session_id.clone(),
            Expiring::new(session.clone(), ttl),
        );
        self.indexes
            .entry(session.user_id)
            .or_default()
            .insert(session.session_id.clone());
    }

    fn remove(&mut self, user_id: Uuid, session_id: &str) {
        self.sessions.remove(session_id);
        if let Some(index) = self.indexes.get_mut(&user_id) {
            index.remove(session_id);
            if index.is_empty() {
                self.indexes.remove(&user_id);
            }
        }
    }

    /// Drop index members whose record has expired or is gone
    fn prune_index(&mut self, user_id: Uuid) {
        let Some(index) = self.indexes.get_mut(&user_id) else {
            return;
        };
        let sessions = &mut self.sessions;
        index.retain(|id| {
            let live = sessions.get(id).map(Expiring::is_live);
            if live == Some(false) {
                sessions.remove(id);
            }
            live == Some(true)
        });
    }

    /// Same guard the Redis scripts apply: the lookup must still point at this session
    fn owns_lookup(&mut self, session: &RefreshSession) -> bool {
        self.lookup(&session.token_hash) == Some(session.session_id.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of session ids indexed for `user_id`
    pub async fn indexed_sessions(&self, user_id: Uuid) -> usize {
        let inner = self.inner.lock().await;
        inner.indexes.get(&user_id).map(HashSet::len).unwrap_or(0)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save_session(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
        ttl: Duration,
    ) -> StoreResult<()> {
        ctx.run(async {
            self.inner.lock().await.insert(session, ttl);
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn get_session(
        &self,
        ctx: &RequestContext,
        session_id: &str,
    ) -> StoreResult<Option<RefreshSession>> {
        ctx.run(async {
            Ok::<_, StoreError>(self.inner.lock().await.session(session_id).cloned())
        })
        .await
    }

    async fn delete_session(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        session_id: &str,
    ) -> StoreResult<()> {
        ctx.run(async {
            self.inner.lock().await.remove(user_id, session_id);
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn delete_all_user_sessions(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
    ) -> StoreResult<usize> {
        ctx.run(async {
            let mut inner = self.inner.lock().await;
            let ids = inner.indexes.remove(&user_id).unwrap_or_default();

            let mut removed = 0;
            for id in ids {
                if let Some(entry) = inner.sessions.remove(&id) {
                    inner.fingerprints.remove(&entry.value.token_hash);
                    if entry.is_live() {
                        removed += 1;
                    }
                }
            }
            Ok::<_, StoreError>(removed)
        })
        .await
    }

    async fn set_refresh_token_id(
        &self,
        ctx: &RequestContext,
        fingerprint: &str,
        session_id: &str,
        ttl: Duration,
    ) -> StoreResult<()> {
        ctx.run(async {
            self.inner.lock().await.fingerprints.insert(
                fingerprint.to_string(),
                Expiring::new(session_id.to_string(), ttl),
            );
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn get_refresh_token_id(
        &self,
        ctx: &RequestContext,
        fingerprint: &str,
    ) -> StoreResult<Option<String>> {
        ctx.run(async {
            Ok::<_, StoreError>(
                self.inner
                    .lock()
                    .await
                    .lookup(fingerprint)
                    .map(str::to_string),
            )
        })
        .await
    }

    async fn delete_refresh_token_id(
        &self,
        ctx: &RequestContext,
        fingerprint: &str,
    ) -> StoreResult<()> {
        ctx.run(async {
            self.inner.lock().await.fingerprints.remove(fingerprint);
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn create_session(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
        ttl: Duration,
    ) -> StoreResult<()> {
        ctx.run(async {
            let mut inner = self.inner.lock().await;
            inner.prune_index(session.user_id);
            inner.insert(session, ttl);
            inner.fingerprints.insert(
                session.token_hash.clone(),
                Expiring::new(session.session_id.clone(), ttl),
            );
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn rotate_session(
        &self,
        ctx: &RequestContext,
        old: &RefreshSession,
        new: &RefreshSession,
        ttl: Duration,
    ) -> StoreResult<bool> {
        ctx.run(async {
            let mut inner = self.inner.lock().await;
            if !inner.owns_lookup(old) || inner.session(&old.session_id).is_none() {
                return Ok::<_, StoreError>(false);
            }

            inner.fingerprints.remove(&old.token_hash);
            inner.remove(old.user_id, &old.session_id);
            inner.insert(new, ttl);
            inner.fingerprints.insert(
                new.token_hash.clone(),
                Expiring::new(new.session_id.clone(), ttl),
            );
            Ok(true)
        })
        .await
    }

    async fn revoke_session(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
    ) -> StoreResult<bool> {
        ctx.run(async {
            let mut inner = self.inner.lock().await;
            if !inner.owns_lookup(session) {
                return Ok::<_, StoreError>(false);
            }

            inner.fingerprints.remove(&session.token_hash);
            inner.remove(session.user_id, &session.session_id);
            Ok(true)
        })
        .await
    }
}
