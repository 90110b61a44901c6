/// Login / refresh / logout state machine
///
/// A refresh session moves ACTIVE -> ROTATED on refresh, or ACTIVE -> REVOKED
/// on logout. Expiry is terminal as well, even before the store purges the
/// record. Rotation and revocation are compare-and-swap in the store, so a
/// given refresh token is accepted at most once.
///
/// ## Failure reporting
///
/// Every credential or session check failure surfaces as
/// `IdentityError::InvalidCredentials`. The concrete reason is only logged.
use crate::cache::{SessionStore, StoreError};
use crate::context::RequestContext;
use crate::db::UserDirectory;
use crate::error::{IdentityError, Result};
use crate::models::{
    AuthenticatedUser, ClientInfo, LoginRequest, LogoutRequest, RefreshRequest, RefreshSession,
    TokenPair, User,
};
use crate::security::{
    fingerprint, fingerprints_match, generate_refresh_token, jwt, PasswordVerifier, TokenSigner,
    DUMMY_PASSWORD_HASH,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Why a request was turned away. Logged, never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    UnknownEmail,
    WrongPassword,
    BadAccessToken,
    UnknownUser,
    UnknownRefreshToken,
    SessionMissing,
    SessionExpired,
    IpMismatch,
    UserAgentMismatch,
    FingerprintMismatch,
    SubjectMismatch,
    AlreadyConsumed,
}

impl Rejection {
    fn as_str(&self) -> &'static str {
        match self {
            Rejection::UnknownEmail => "unknown_email",
            Rejection::WrongPassword => "wrong_password",
            Rejection::BadAccessToken => "bad_access_token",
            Rejection::UnknownUser => "unknown_user",
            Rejection::UnknownRefreshToken => "unknown_refresh_token",
            Rejection::SessionMissing => "session_missing",
            Rejection::SessionExpired => "session_expired",
            Rejection::IpMismatch => "ip_mismatch",
            Rejection::UserAgentMismatch => "user_agent_mismatch",
            Rejection::FingerprintMismatch => "fingerprint_mismatch",
            Rejection::SubjectMismatch => "subject_mismatch",
            Rejection::AlreadyConsumed => "already_consumed",
        }
    }
}

fn reject(reason: Rejection) -> IdentityError {
    warn!(reason = reason.as_str(), "Credential check failed");
    IdentityError::InvalidCredentials
}

fn store_failure(err: StoreError) -> IdentityError {
    error!(error = %err, "Session store call failed");
    IdentityError::Store(err)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpiryCheck {
    Enforce,
    Skip,
}

/// Issues, rotates and revokes credentials
#[derive(Clone)]
pub struct AuthFlow {
    users: Arc<dyn UserDirectory>,
    passwords: Arc<dyn PasswordVerifier>,
    sessions: Arc<dyn SessionStore>,
    signer: Arc<TokenSigner>,
    refresh_ttl: Duration,
}

impl AuthFlow {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        passwords: Arc<dyn PasswordVerifier>,
        sessions: Arc<dyn SessionStore>,
        signer: Arc<TokenSigner>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            users,
            passwords,
            sessions,
            signer,
            refresh_ttl,
        }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Authenticate with email and password and open a new session bound to `client`
    #[tracing::instrument(skip_all, fields(request_id = %ctx.request_id()))]
    pub async fn login(
        &self,
        ctx: &RequestContext,
        request: &LoginRequest,
        client: &ClientInfo,
    ) -> Result<TokenPair> {
        request.validate()?;

        let Some(user) = self.users.get_by_email(ctx, &request.email).await? else {
            // Burn the same Argon2 cost as a wrong password
            let _ = self
                .passwords
                .verify(DUMMY_PASSWORD_HASH, &request.password)
                .await;
            return Err(reject(Rejection::UnknownEmail));
        };

        if !self
            .passwords
            .verify(&user.password_hash, &request.password)
            .await?
        {
            return Err(reject(Rejection::WrongPassword));
        }

        let (pair, session) = self.mint(&user, client)?;
        self.sessions
            .create_session(ctx, &session, self.refresh_ttl)
            .await
            .map_err(store_failure)?;

        info!(user_id = %user.id, session_id = %session.session_id, "User logged in");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair; the presented token is consumed
    #[tracing::instrument(skip_all, fields(request_id = %ctx.request_id()))]
    pub async fn refresh(
        &self,
        ctx: &RequestContext,
        request: &RefreshRequest,
        client: &ClientInfo,
    ) -> Result<TokenPair> {
        request.validate()?;

        // The refresh session decides liveness, so an expired access token is fine here.
        let claims = self
            .signer
            .verifier()
            .parse_access_token_allow_expired(&request.access_token)
            .map_err(|_| reject(Rejection::BadAccessToken))?;
        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| reject(Rejection::BadAccessToken))?;

        let user = self
            .users
            .get_by_id(ctx, user_id)
            .await?
            .ok_or_else(|| reject(Rejection::UnknownUser))?;

        let current = self
            .resolve(ctx, &request.refresh_token, client, ExpiryCheck::Enforce)
            .await?;
        if current.user_id != user.id {
            return Err(reject(Rejection::SubjectMismatch));
        }

        let (pair, next) = self.mint(&user, client)?;
        let rotated = self
            .sessions
            .rotate_session(ctx, &current, &next, self.refresh_ttl)
            .await
            .map_err(store_failure)?;
        if !rotated {
            return Err(reject(Rejection::AlreadyConsumed));
        }

        info!(
            user_id = %user.id,
            old_session_id = %current.session_id,
            session_id = %next.session_id,
            "Session rotated"
        );
        Ok(pair)
    }

    /// Revoke the session behind one refresh token
    #[tracing::instrument(skip_all, fields(request_id = %ctx.request_id()))]
    pub async fn logout(
        &self,
        ctx: &RequestContext,
        request: &LogoutRequest,
        client: &ClientInfo,
    ) -> Result<()> {
        request.validate()?;

        let session = self
            .resolve(ctx, &request.refresh_token, client, ExpiryCheck::Skip)
            .await?;

        let revoked = self
            .sessions
            .revoke_session(ctx, &session)
            .await
            .map_err(store_failure)?;
        if !revoked {
            return Err(reject(Rejection::AlreadyConsumed));
        }

        info!(user_id = %session.user_id, session_id = %session.session_id, "Session revoked");
        Ok(())
    }

    /// Revoke every session of the user who owns the presented refresh token.
    ///
    /// Returns the number of sessions removed.
    #[tracing::instrument(skip_all, fields(request_id = %ctx.request_id()))]
    pub async fn logout_all_devices(
        &self,
        ctx: &RequestContext,
        request: &LogoutRequest,
        client: &ClientInfo,
    ) -> Result<usize> {
        request.validate()?;

        let session = self
            .resolve(ctx, &request.refresh_token, client, ExpiryCheck::Skip)
            .await?;

        let removed = self
            .sessions
            .delete_all_user_sessions(ctx, session.user_id)
            .await
            .map_err(store_failure)?;

        warn!(user_id = %session.user_id, removed, "All sessions revoked");
        Ok(removed)
    }

    /// Stateless access-token check for protected routes
    #[tracing::instrument(skip_all, fields(request_id = %ctx.request_id()))]
    pub fn authenticate(
        &self,
        ctx: &RequestContext,
        authorization_header: &str,
    ) -> Result<AuthenticatedUser> {
        let token = jwt::extract_bearer_token(authorization_header)?;
        let claims = self.signer.verifier().parse_access_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| IdentityError::InvalidToken)?;

        Ok(AuthenticatedUser {
            user_id,
            role: claims.role.as_deref().and_then(|role| role.parse().ok()),
        })
    }

    /// Find the live session behind `refresh_token` and check it belongs to `client`
    async fn resolve(
        &self,
        ctx: &RequestContext,
        refresh_token: &str,
        client: &ClientInfo,
        expiry: ExpiryCheck,
    ) -> Result<RefreshSession> {
        let digest = fingerprint(refresh_token);

        let session_id = self
            .sessions
            .get_refresh_token_id(ctx, &digest)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| reject(Rejection::UnknownRefreshToken))?;

        let session = self
            .sessions
            .get_session(ctx, &session_id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| reject(Rejection::SessionMissing))?;

        if expiry == ExpiryCheck::Enforce && session.is_expired() {
            return Err(reject(Rejection::SessionExpired));
        }
        if session.client_ip != client.ip {
            return Err(reject(Rejection::IpMismatch));
        }
        if session.user_agent != client.user_agent {
            return Err(reject(Rejection::UserAgentMismatch));
        }
        if !fingerprints_match(&digest, &session.token_hash) {
            return Err(reject(Rejection::FingerprintMismatch));
        }

        Ok(session)
    }

    /// New access token plus the session record for a new refresh token
    fn mint(&self, user: &User, client: &ClientInfo) -> Result<(TokenPair, RefreshSession)> {
        let access_token = self
            .signer
            .generate_access_token(&user.id.to_string(), Some(user.role.as_str()))?;
        let refresh = generate_refresh_token()?;

        let ttl = chrono::Duration::from_std(self.refresh_ttl)
            .map_err(|e| IdentityError::Config(format!("Refresh TTL out of range: {}", e)))?;
        let session = RefreshSession::new(
            refresh.session_id,
            user.id,
            fingerprint(&refresh.plaintext),
            ttl,
            client,
        )
        .ok_or_else(|| IdentityError::Config("Refresh TTL overflows session expiry".into()))?;

        let pair = TokenPair::bearer(
            access_token,
            refresh.plaintext,
            self.signer.access_ttl().as_secs(),
        );
        Ok((pair, session))
    }
}
