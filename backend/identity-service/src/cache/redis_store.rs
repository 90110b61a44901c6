/// Redis-backed `SessionStore`
///
/// Plain writes go through MULTI/EXEC pipelines. The guarded compounds
/// (rotate, revoke, revoke-all) run as Lua scripts so the check and the
/// writes execute as one command on the server. `create_session` also sweeps
/// ids of TTL-expired records out of the user's index first.
use super::{ttl_secs, SessionKeys, SessionStore, StoreResult};
use crate::context::RequestContext;
use crate::models::RefreshSession;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::Script;
use redis_utils::SharedConnectionManager;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// KEYS: old lookup, old record, old index, new record, new lookup, new index
/// ARGV: old id, new id, new record JSON, ttl seconds
static ROTATE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        if redis.call('GET', KEYS[1]) ~= ARGV[1] then
            return 0
        end
        if redis.call('EXISTS', KEYS[2]) == 0 then
            return 0
        end
        redis.call('DEL', KEYS[1], KEYS[2])
        redis.call('SREM', KEYS[3], ARGV[1])
        redis.call('SET', KEYS[4], ARGV[3], 'EX', ARGV[4])
        redis.call('SADD', KEYS[6], ARGV[2])
        redis.call('SET', KEYS[5], ARGV[2], 'EX', ARGV[4])
        return 1
        "#,
    )
});

/// KEYS: lookup, record, index
/// ARGV: session id
static REVOKE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        if redis.call('GET', KEYS[1]) ~= ARGV[1] then
            return 0
        end
        redis.call('DEL', KEYS[1], KEYS[2])
        redis.call('SREM', KEYS[3], ARGV[1])
        return 1
        "#,
    )
});

/// KEYS: index
/// ARGV: record key prefix, lookup key prefix
static REVOKE_ALL_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local ids = redis.call('SMEMBERS', KEYS[1])
        local removed = 0
        for _, id in ipairs(ids) do
            local record_key = ARGV[1] .. id
            local raw = redis.call('GET', record_key)
            if raw then
                local ok, record = pcall(cjson.decode, raw)
                if ok and type(record) == 'table' and record['token_hash'] then
                    redis.call('DEL', ARGV[2] .. record['token_hash'])
                end
                redis.call('DEL', record_key)
                removed = removed + 1
            end
        end
        redis.call('DEL', KEYS[1])
        return removed
        "#,
    )
});

/// Drops index members whose record has already expired.
///
/// KEYS: index
/// ARGV: record key prefix
static PRUNE_INDEX_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local pruned = 0
        for _, id in ipairs(redis.call('SMEMBERS', KEYS[1])) do
            if redis.call('EXISTS', ARGV[1] .. id) == 0 then
                redis.call('SREM', KEYS[1], id)
                pruned = pruned + 1
            end
        end
        return pruned
        "#,
    )
});

#[derive(Clone)]
pub struct RedisSessionStore {
    redis: SharedConnectionManager,
    keys: SessionKeys,
}

impl RedisSessionStore {
    pub fn new(redis: SharedConnectionManager, keys: SessionKeys) -> Self {
        Self { redis, keys }
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn save_session(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
        ttl: Duration,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(session)?;
        let mut redis_conn = self.redis.lock().await.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(self.keys.session(&session.session_id))
            .arg(&payload)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .ignore()
            .cmd("SADD")
            .arg(self.keys.index(session.user_id))
            .arg(&session.session_id)
            .ignore();

        ctx.run(pipe.query_async::<_, ()>(&mut redis_conn)).await?;
        debug!(session_id = %session.session_id, "Session saved");
        Ok(())
    }

    async fn get_session(
        &self,
        ctx: &RequestContext,
        session_id: &str,
    ) -> StoreResult<Option<RefreshSession>> {
        let key = self.keys.session(session_id);
        let mut redis_conn = self.redis.lock().await.clone();

        let raw: Option<String> = ctx
            .run(redis::cmd("GET").arg(&key).query_async(&mut redis_conn))
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete_session(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        session_id: &str,
    ) -> StoreResult<()> {
        let mut redis_conn = self.redis.lock().await.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("DEL")
            .arg(self.keys.session(session_id))
            .ignore()
            .cmd("SREM")
            .arg(self.keys.index(user_id))
            .arg(session_id)
            .ignore();

        ctx.run(pipe.query_async::<_, ()>(&mut redis_conn)).await?;
        Ok(())
    }

    async fn delete_all_user_sessions(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
    ) -> StoreResult<usize> {
        let mut redis_conn = self.redis.lock().await.clone();

        let mut invocation = REVOKE_ALL_SCRIPT.prepare_invoke();
        invocation
            .key(self.keys.index(user_id))
            .arg(self.keys.session_prefix())
            .arg(self.keys.fingerprint_prefix());

        let removed: i64 = ctx
            .run(invocation.invoke_async(&mut redis_conn))
            .await?;

        debug!(user_id = %user_id, removed, "User sessions deleted");
        Ok(usize::try_from(removed).unwrap_or(0))
    }

    async fn set_refresh_token_id(
        &self,
        ctx: &RequestContext,
        fingerprint: &str,
        session_id: &str,
        ttl: Duration,
    ) -> StoreResult<()> {
        let mut redis_conn = self.redis.lock().await.clone();

        ctx.run(
            redis::cmd("SET")
                .arg(self.keys.fingerprint(fingerprint))
                .arg(session_id)
                .arg("EX")
                .arg(ttl_secs(ttl))
                .query_async::<_, ()>(&mut redis_conn),
        )
        .await
    }

    async fn get_refresh_token_id(
        &self,
        ctx: &RequestContext,
        fingerprint: &str,
    ) -> StoreResult<Option<String>> {
        let mut redis_conn = self.redis.lock().await.clone();

        ctx.run(
            redis::cmd("GET")
                .arg(self.keys.fingerprint(fingerprint))
                .query_async(&mut redis_conn),
        )
        .await
    }

    async fn delete_refresh_token_id(
        &self,
        ctx: &RequestContext,
        fingerprint: &str,
    ) -> StoreResult<()> {
        let mut redis_conn = self.redis.lock().await.clone();

        ctx.run(
            redis::cmd("DEL")
                .arg(self.keys.fingerprint(fingerprint))
                .query_async::<_, ()>(&mut redis_conn),
        )
        .await
    }

    async fn create_session(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
        ttl: Duration,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(session)?;
        let ttl = ttl_secs(ttl);
        let index = self.keys.index(session.user_id);
        let mut redis_conn = self.redis.lock().await.clone();

        // TTL expiry leaves ids behind in the index; sweep them on each login
        let mut prune = PRUNE_INDEX_SCRIPT.prepare_invoke();
        prune.key(&index).arg(self.keys.session_prefix());
        let pruned: i64 = ctx.run(prune.invoke_async(&mut redis_conn)).await?;
        if pruned > 0 {
            debug!(user_id = %session.user_id, pruned, "Pruned expired index entries");
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(self.keys.session(&session.session_id))
            .arg(&payload)
            .arg("EX")
            .arg(ttl)
            .ignore()
            .cmd("SADD")
            .arg(&index)
            .arg(&session.session_id)
            .ignore()
            .cmd("SET")
            .arg(self.keys.fingerprint(&session.token_hash))
            .arg(&session.session_id)
            .arg("EX")
            .arg(ttl)
            .ignore();

        ctx.run(pipe.query_async::<_, ()>(&mut redis_conn)).await?;
        debug!(session_id = %session.session_id, "Session created");
        Ok(())
    }

    async fn rotate_session(
        &self,
        ctx: &RequestContext,
        old: &RefreshSession,
        new: &RefreshSession,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let payload = serde_json::to_string(new)?;
        let mut redis_conn = self.redis.lock().await.clone();

        let mut invocation = ROTATE_SCRIPT.prepare_invoke();
        invocation
            .key(self.keys.fingerprint(&old.token_hash))
            .key(self.keys.session(&old.session_id))
            .key(self.keys.index(old.user_id))
            .key(self.keys.session(&new.session_id))
            .key(self.keys.fingerprint(&new.token_hash))
            .key(self.keys.index(new.user_id))
            .arg(&old.session_id)
            .arg(&new.session_id)
            .arg(&payload)
            .arg(ttl_secs(ttl));

        let swapped: i64 = ctx
            .run(invocation.invoke_async(&mut redis_conn))
            .await?;

        Ok(swapped == 1)
    }

    async fn revoke_session(
        &self,
        ctx: &RequestContext,
        session: &RefreshSession,
    ) -> StoreResult<bool> {
        let mut redis_conn = self.redis.lock().await.clone();

        let mut invocation = REVOKE_SCRIPT.prepare_invoke();
        invocation
            .key(self.keys.fingerprint(&session.token_hash))
            .key(self.keys.session(&session.session_id))
            .key(self.keys.index(session.user_id))
            .arg(&session.session_id);

        let revoked: i64 = ctx
            .run(invocation.invoke_async(&mut redis_conn))
            .await?;

        Ok(revoked == 1)
    }
}
