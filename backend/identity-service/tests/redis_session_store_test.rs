// Integration tests for RedisSessionStore
//
// Requires a reachable Redis. Uses REDIS_TEST_URL, falling back to
// redis://127.0.0.1:6379; every test is skipped when neither answers.
//
//   docker run --rm -p 6379:6379 redis:7
//   cargo test -p identity-service --test redis_session_store_test -- --nocapture
//
// Each test works under its own random key prefix so runs do not collide.

mod common;

use common::*;
use identity_service::cache::{RedisSessionStore, SessionKeys, SessionStore};
use identity_service::context::RequestContext;
use identity_service::models::{ClientInfo, RefreshSession};
use identity_service::IdentityError;
use redis_utils::RedisPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn connect() -> Option<(RedisPool, RedisSessionStore)> {
    let url = std::env::var("REDIS_TEST_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let pool = match RedisPool::connect(&url, Duration::from_secs(1)).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("skipping: Redis unavailable at {}: {:#}", url, e);
            return None;
        }
    };
    if let Err(e) = pool.ping().await {
        eprintln!("skipping: Redis PING failed: {:#}", e);
        return None;
    }

    let keys = SessionKeys::new(format!("nova:auth:test:{}", Uuid::new_v4()));
    let store = RedisSessionStore::new(pool.manager(), keys);
    Some((pool, store))
}

fn ctx() -> RequestContext {
    RequestContext::new(Duration::from_secs(5))
}

fn session(user_id: Uuid, token: &str) -> RefreshSession {
    RefreshSession::new(
        Uuid::new_v4().to_string(),
        user_id,
        identity_service::security::fingerprint(token),
        chrono::Duration::hours(1),
        &ClientInfo::new("10.1.2.3", "nova-android/4.0"),
    )
    .unwrap()
}

async fn key_exists(pool: &RedisPool, key: &str) -> bool {
    let mut conn = pool.manager().lock().await.clone();
    let exists: i64 = redis::cmd("EXISTS")
        .arg(key)
        .query_async(&mut conn)
        .await
        .unwrap();
    exists == 1
}

async fn ttl_of(pool: &RedisPool, key: &str) -> i64 {
    let mut conn = pool.manager().lock().await.clone();
    redis::cmd("TTL").arg(key).query_async(&mut conn).await.unwrap()
}

#[tokio::test]
async fn test_create_writes_record_index_and_lookup() {
    let Some((pool, store)) = connect().await else { return };
    let user_id = Uuid::new_v4();
    let s = session(user_id, "token-a");

    store.create_session(&ctx(), &s, REFRESH_TTL).await.unwrap();

    assert_eq!(
        store.get_session(&ctx(), &s.session_id).await.unwrap(),
        Some(s.clone())
    );
    assert_eq!(
        store.get_refresh_token_id(&ctx(), &s.token_hash).await.unwrap(),
        Some(s.session_id.clone())
    );

    let keys = store.keys();
    let record_ttl = ttl_of(&pool, &keys.session(&s.session_id)).await;
    assert!(record_ttl > 0 && record_ttl <= REFRESH_TTL.as_secs() as i64);
    assert!(ttl_of(&pool, &keys.fingerprint(&s.token_hash)).await > 0);
    // The index has no TTL
    assert_eq!(ttl_of(&pool, &keys.index(user_id)).await, -1);

    store.delete_all_user_sessions(&ctx(), user_id).await.unwrap();
}

async fn index_size(pool: &RedisPool, key: &str) -> i64 {
    let mut conn = pool.manager().lock().await.clone();
    redis::cmd("SCARD").arg(key).query_async(&mut conn).await.unwrap()
}

#[tokio::test]
async fn test_create_prunes_expired_index_entries() {
    let Some((pool, store)) = connect().await else { return };
    let user_id = Uuid::new_v4();
    let short_lived = session(user_id, "token-short");
    let kept = session(user_id, "token-kept");

    store
        .create_session(&ctx(), &short_lived, Duration::from_secs(1))
        .await
        .unwrap();
    store.create_session(&ctx(), &kept, REFRESH_TTL).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let index = store.keys().index(user_id);
    assert_eq!(index_size(&pool, &index).await, 2);

    let next = session(user_id, "token-next");
    store.create_session(&ctx(), &next, REFRESH_TTL).await.unwrap();
    assert_eq!(index_size(&pool, &index).await, 2);
    assert!(store.get_session(&ctx(), &kept.session_id).await.unwrap().is_some());

    store.delete_all_user_sessions(&ctx(), user_id).await.unwrap();
}

#[tokio::test]
async fn test_primitive_operations() {
    let Some((pool, store)) = connect().await else { return };
    let user_id = Uuid::new_v4();
    let s = session(user_id, "token-p");

    store.save_session(&ctx(), &s, REFRESH_TTL).await.unwrap();
    store
        .set_refresh_token_id(&ctx(), &s.token_hash, &s.session_id, REFRESH_TTL)
        .await
        .unwrap();
    assert!(store.get_session(&ctx(), &s.session_id).await.unwrap().is_some());

    store
        .delete_refresh_token_id(&ctx(), &s.token_hash)
        .await
        .unwrap();
    assert!(store
        .get_refresh_token_id(&ctx(), &s.token_hash)
        .await
        .unwrap()
        .is_none());

    store
        .delete_session(&ctx(), user_id, &s.session_id)
        .await
        .unwrap();
    assert!(store.get_session(&ctx(), &s.session_id).await.unwrap().is_none());
    assert!(!key_exists(&pool, &store.keys().index(user_id)).await);
}

#[tokio::test]
async fn test_rotate_is_compare_and_swap() {
    let Some((pool, store)) = connect().await else { return };
    let user_id = Uuid::new_v4();
    let old = session(user_id, "token-old");
    let first = session(user_id, "token-first");
    let second = session(user_id, "token-second");

    store.create_session(&ctx(), &old, REFRESH_TTL).await.unwrap();

    assert!(store.rotate_session(&ctx(), &old, &first, REFRESH_TTL).await.unwrap());
    assert!(!store.rotate_session(&ctx(), &old, &second, REFRESH_TTL).await.unwrap());

    let keys = store.keys();
    assert!(!key_exists(&pool, &keys.session(&old.session_id)).await);
    assert!(!key_exists(&pool, &keys.fingerprint(&old.token_hash)).await);
    assert!(!key_exists(&pool, &keys.session(&second.session_id)).await);
    assert!(key_exists(&pool, &keys.session(&first.session_id)).await);
    assert_eq!(
        store.get_refresh_token_id(&ctx(), &first.token_hash).await.unwrap(),
        Some(first.session_id.clone())
    );

    let mut conn = pool.manager().lock().await.clone();
    let members: Vec<String> = redis::cmd("SMEMBERS")
        .arg(keys.index(user_id))
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(members, vec![first.session_id.clone()]);

    store.delete_all_user_sessions(&ctx(), user_id).await.unwrap();
}

#[tokio::test]
async fn test_revoke_then_revoke_again() {
    let Some((_pool, store)) = connect().await else { return };
    let s = session(Uuid::new_v4(), "token-r");

    store.create_session(&ctx(), &s, REFRESH_TTL).await.unwrap();
    assert!(store.revoke_session(&ctx(), &s).await.unwrap());
    assert!(!store.revoke_session(&ctx(), &s).await.unwrap());
    assert!(store.get_session(&ctx(), &s.session_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_all_cascades_reverse_lookups() {
    let Some((pool, store)) = connect().await else { return };
    let user_id = Uuid::new_v4();
    let sessions: Vec<_> = (0..3)
        .map(|i| session(user_id, &format!("token-{}", i)))
        .collect();
    for s in &sessions {
        store.create_session(&ctx(), s, REFRESH_TTL).await.unwrap();
    }

    assert_eq!(store.delete_all_user_sessions(&ctx(), user_id).await.unwrap(), 3);

    let keys = store.keys();
    for s in &sessions {
        assert!(!key_exists(&pool, &keys.session(&s.session_id)).await);
        assert!(!key_exists(&pool, &keys.fingerprint(&s.token_hash)).await);
    }
    assert!(!key_exists(&pool, &keys.index(user_id)).await);
    assert_eq!(store.delete_all_user_sessions(&ctx(), user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancelled_context_sends_nothing() {
    let Some((pool, store)) = connect().await else { return };
    let s = session(Uuid::new_v4(), "token-c");
    let (ctx, cancel) = RequestContext::cancellable(Duration::from_secs(5));
    cancel.cancel();

    assert!(store.create_session(&ctx, &s, REFRESH_TTL).await.is_err());
    assert!(!key_exists(&pool, &store.keys().session(&s.session_id)).await);
}

#[tokio::test]
async fn test_full_flow_against_redis() {
    let Some((_pool, store)) = connect().await else { return };
    let h = Harness::with_store(Arc::new(store), REFRESH_TTL).await;

    let first = h.flow.login(&ctx(), &login_request(), &phone()).await.unwrap();
    let second = h
        .flow
        .refresh(&ctx(), &refresh_request(&first), &phone())
        .await
        .unwrap();

    let replay = h.flow.refresh(&ctx(), &refresh_request(&first), &phone()).await;
    assert!(matches!(replay, Err(IdentityError::InvalidCredentials)));

    let request = refresh_request(&second);
    let (ctx_a, ctx_b) = (ctx(), ctx());
    let (client_a, client_b) = (phone(), phone());
    let (a, b) = tokio::join!(
        h.flow.refresh(&ctx_a, &request, &client_a),
        h.flow.refresh(&ctx_b, &request, &client_b),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

    let latest = a.or(b).unwrap();
    let removed = h
        .flow
        .logout_all_devices(&ctx(), &logout_request(&latest), &phone())
        .await
        .unwrap();
    assert_eq!(removed, 1);
}
