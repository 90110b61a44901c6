// Shared fixtures for identity-service integration tests
#![allow(dead_code)]

use identity_service::cache::{InMemorySessionStore, SessionStore};
use identity_service::db::InMemoryUserDirectory;
use identity_service::models::{ClientInfo, LoginRequest, LogoutRequest, RefreshRequest, Role, TokenPair, User};
use identity_service::security::{hash_password, Argon2PasswordVerifier, TokenSigner};
use identity_service::AuthFlow;
use std::sync::Arc;
use std::time::Duration;

// Test RSA key pair - FOR TESTING ONLY
pub const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/test_rsa_private.pem");
pub const TEST_PUBLIC_KEY: &str = include_str!("../fixtures/test_rsa_public.pem");

pub const ISSUER: &str = "nova-test";
pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "correct horse battery staple";
pub const ACCESS_TTL: Duration = Duration::from_secs(900);
pub const REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

pub fn signer() -> Arc<TokenSigner> {
    Arc::new(TokenSigner::from_rsa_pem(TEST_PRIVATE_KEY, TEST_PUBLIC_KEY, ISSUER, ACCESS_TTL).unwrap())
}

pub fn phone() -> ClientInfo {
    ClientInfo::new("203.0.113.9", "nova-ios/5.2 (iPhone15,2)")
}

pub fn laptop() -> ClientInfo {
    ClientInfo::new("198.51.100.20", "Mozilla/5.0 (Macintosh) nova-web/3.1")
}

pub fn login_request() -> LoginRequest {
    LoginRequest {
        email: EMAIL.to_string(),
        password: PASSWORD.to_string(),
    }
}

pub fn refresh_request(pair: &TokenPair) -> RefreshRequest {
    RefreshRequest {
        access_token: pair.access_token.clone(),
        refresh_token: pair.refresh_token.clone(),
    }
}

pub fn logout_request(pair: &TokenPair) -> LogoutRequest {
    LogoutRequest {
        refresh_token: pair.refresh_token.clone(),
    }
}

/// An `AuthFlow` with one registered user
pub struct Harness {
    pub flow: AuthFlow,
    pub users: Arc<InMemoryUserDirectory>,
    pub user: User,
}

impl Harness {
    pub async fn with_store(store: Arc<dyn SessionStore>, refresh_ttl: Duration) -> Self {
        let users = Arc::new(InMemoryUserDirectory::new());
        let user = User::new(EMAIL, hash_password(PASSWORD).unwrap(), Role::User);
        users.insert(user.clone()).await;

        let flow = AuthFlow::new(
            users.clone(),
            Arc::new(Argon2PasswordVerifier),
            store,
            signer(),
            refresh_ttl,
        );

        Self { flow, users, user }
    }

    /// Harness over an in-memory store, returning the store for inspection
    pub async fn in_memory() -> (Self, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        let harness = Self::with_store(store.clone(), REFRESH_TTL).await;
        (harness, store)
    }
}
