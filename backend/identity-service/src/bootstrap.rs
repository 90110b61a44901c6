//! Composition root: turns `Settings` into a ready `AuthFlow`.

use crate::cache::{RedisSessionStore, SessionKeys};
use crate::config::{JwtSettings, Settings};
use crate::context::RequestContext;
use crate::db::UserDirectory;
use crate::security::{PasswordVerifier, TokenSigner};
use crate::services::AuthFlow;
use anyhow::{Context, Result};
use redis_utils::RedisPool;
use std::sync::Arc;
use tracing::info;

/// Build the RS256 signer from PEM settings
pub fn build_signer(jwt: &JwtSettings) -> Result<TokenSigner> {
    TokenSigner::from_rsa_pem(&jwt.private_key, &jwt.public_key, &jwt.issuer, jwt.access_ttl())
        .context("Failed to initialize JWT keys")
}

/// Connect to Redis and wire the auth flow around the supplied collaborators
pub async fn build_auth_flow(
    settings: &Settings,
    users: Arc<dyn UserDirectory>,
    passwords: Arc<dyn PasswordVerifier>,
) -> Result<AuthFlow> {
    settings.validate()?;

    let signer = build_signer(&settings.jwt)?;

    let pool = RedisPool::connect(&settings.redis.url, settings.redis.connection_timeout())
        .await
        .context("Failed to connect to Redis session store")?;
    let store = RedisSessionStore::new(
        pool.manager(),
        SessionKeys::new(settings.redis.key_prefix.clone()),
    );

    info!(
        redis = %pool.address(),
        issuer = %settings.jwt.issuer,
        access_ttl_secs = settings.jwt.access_ttl_seconds,
        refresh_ttl_secs = settings.session.refresh_ttl_seconds,
        "Auth flow initialized"
    );

    Ok(AuthFlow::new(
        users,
        passwords,
        Arc::new(store),
        Arc::new(signer),
        settings.session.refresh_ttl(),
    ))
}

/// Fresh per-request context using the configured operation timeout
pub fn request_context(settings: &Settings) -> RequestContext {
    RequestContext::new(settings.session.operation_timeout())
}
