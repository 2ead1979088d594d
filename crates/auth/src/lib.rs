//! AuthGateway: login, TOTP verification, session lifecycle,
//! CSRF, and permission checks. Session-cookie-backed rather than
//! JWT-backed, since the store already persists sessions and what's
//! wanted here is sliding session cookies, not bearer tokens.

pub mod cookies;
pub mod csrf;
mod error;
pub mod rate_limit;
pub mod security_log;
pub mod totp_replay;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use rfctl_crypto::{CredentialVault, ExposeSecret};
use rfctl_model::{Permission, Session, SystemStateKey, User};
use rfctl_store::Store;

pub use cookies::CookiePolicy;
pub use error::AuthError;
pub use rate_limit::{LoginRateLimiter, RateLimitTier};
pub use security_log::{SecurityEvent, SecuritySeverity, SecurityLog};
pub use totp_replay::TotpReplayGuard;

const MIN_PASSWORD_LEN: usize = 8;
const PENDING_SETUP_LIFETIME_MINUTES: i64 = 15;

/// What a successful `login` call hands back to the caller; the session
/// and CSRF cookies are always minted, but what the client must do next
/// depends on the account's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// No TOTP configured and not a temporary account: the session is
    /// already fully verified.
    Authenticated { initial_setup_required: bool },
    /// TOTP is configured; the client must call `verify_totp`.
    TotpRequired,
    /// A temporary account; the client must call `complete_setup` then
    /// `verify_setup`.
    SetupRequired,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub session_token: String,
    pub csrf_token: String,
    pub username: String,
    pub status: LoginStatus,
}

#[derive(Debug, Clone)]
pub struct VerifiedTotp {
    pub username: String,
    pub password_change_required: bool,
}

#[derive(Debug, Clone)]
pub struct SetupStep1 {
    pub totp_secret: String,
    pub provisioning_uri: String,
}

/// The auth and identity surface sitting between the HTTP layer and the
/// store. Cheap to clone.
#[derive(Clone)]
pub struct AuthGateway {
    store: Arc<Store>,
    vault: Arc<CredentialVault>,
    rate_limiter: Arc<LoginRateLimiter>,
    replay_guard: Arc<TotpReplayGuard>,
    security_log: Arc<SecurityLog>,
}

impl AuthGateway {
    #[must_use]
    pub fn new(store: Arc<Store>, vault: Arc<CredentialVault>) -> Self {
        Self::with_tier(store, vault, RateLimitTier::default())
    }

    #[must_use]
    pub fn with_tier(store: Arc<Store>, vault: Arc<CredentialVault>, tier: RateLimitTier) -> Self {
        Self {
            store,
            vault,
            rate_limiter: Arc::new(LoginRateLimiter::new(tier)),
            replay_guard: Arc::new(TotpReplayGuard::new()),
            security_log: Arc::new(SecurityLog::new()),
        }
    }

    #[must_use]
    pub fn security_log(&self) -> &SecurityLog {
        &self.security_log
    }

    /// Periodic sweeps the scheduler's reaper loop should drive alongside
    /// its store-backed cleanups.
    pub async fn cleanup_expired_totp_codes(&self) -> u64 {
        self.replay_guard.cleanup_expired().await
    }

    pub async fn cleanup_rate_limit_windows(&self) -> u64 {
        self.rate_limiter.cleanup_expired().await
    }

    async fn log_event(
        &self,
        event_type: &str,
        username: Option<&str>,
        source_addr: &str,
        user_agent: &str,
        severity: SecuritySeverity,
        context: &[(&str, &str)],
    ) {
        let mut event = SecurityEvent::new(event_type, source_addr, user_agent, severity);
        if let Some(u) = username {
            event = event.with_username(u);
        }
        for &(k, v) in context {
            event = event.with_context(k, v.to_owned());
        }
        self.security_log.record(event).await;
    }

    /// Login: constant-time password verification, then mints either a
    /// fully-verified or pre-verified session depending on the account's
    /// TOTP/temporary status.
    pub async fn login(
        &self,
        source_addr: &str,
        user_agent: &str,
        username: &str,
        password: &str,
    ) -> Result<LoginResult, AuthError> {
        if let Err(retry_after) = self.rate_limiter.check(source_addr).await {
            return Err(AuthError::RateLimited(retry_after));
        }

        let user = self.store.get_user(username).await?;

        // Always runs bcrypt, even for a nonexistent user, so login timing
        // doesn't leak account existence ("constant time").
        let password_hash = user
        .as_ref().map_or_else(|| rfctl_crypto::dummy_password_hash().to_owned(), |u| u.password_hash.clone());
        let password_valid = rfctl_crypto::verify_password(password, &password_hash);

        let disabled_and_permanent = user.as_ref().is_some_and(|u| !u.enabled && !u.is_temporary);
        if user.is_none() || !password_valid || disabled_and_permanent {
            let reason = if user.is_none() {
                "user_not_found"
            } else if !password_valid {
                "wrong_password"
            } else {
                "account_disabled"
            };
            self.log_event(
                "failed_login",
                Some(username),
                source_addr,
                user_agent,
                SecuritySeverity::Warning,
                &[("reason", reason)],
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        }
        let user = user.expect("checked above");

        let now = Utc::now();
        let session_token = rfctl_crypto::generate_session_token();
        let csrf_token = rfctl_crypto::generate_csrf_token();

        let status = if user.is_temporary {
            LoginStatus::SetupRequired
        } else if user.has_totp() {
            LoginStatus::TotpRequired
        } else {
            LoginStatus::Authenticated {
                initial_setup_required: self.store.get_bool_state(SystemStateKey::InitialSetupRequired).await?,
            }
        };

        let totp_verified = matches!(status, LoginStatus::Authenticated {.. });
        self.store
        .create_session(&Session {
                token: session_token.clone(),
                username: username.to_owned(),
                expires_utc: now + ChronoDuration::hours(cookies::SESSION_LIFETIME_HOURS),
                totp_verified,
                created_at: now,
        })
        .await?;

        if totp_verified {
            self.store.update_user(&User { last_login: Some(now),..user }).await?;
        }

        self.log_event(
            "successful_login",
            Some(username),
            source_addr,
            user_agent,
            SecuritySeverity::Info,
            &[("totp_required", if totp_verified { "false" } else { "true" })],
        )
        .await;

        Ok(LoginResult { session_token, csrf_token, username: username.to_owned(), status })
    }

    /// Verify-TOTP: ±1 step window, 120s replay protection.
    pub async fn verify_totp(
        &self,
        source_addr: &str,
        user_agent: &str,
        session_token: &str,
        totp_code: &str,
    ) -> Result<VerifiedTotp, AuthError> {
        if let Err(retry_after) = self.rate_limiter.check(source_addr).await {
            return Err(AuthError::RateLimited(retry_after));
        }

        let session = self.fetch_live_session(session_token).await?;
        let username = session.username.clone();

        let user = self.store.get_user(&username).await?.ok_or(AuthError::SessionNotFound)?;
        let Some(encrypted_secret) = user.totp_secret_encrypted.as_deref() else {
            return Err(AuthError::SessionNotFound);
        };
        let Some(secret) = self.vault.decrypt_totp(encrypted_secret) else {
            return Err(AuthError::SessionNotFound);
        };

        if !self.replay_guard.mark_used(&username, totp_code).await {
            self.log_event(
                "totp_replay_attempt",
                Some(&username),
                source_addr,
                user_agent,
                SecuritySeverity::Warning,
                &[],
            )
            .await;
            return Err(AuthError::TotpReplay);
        }

        let unix_time = Utc::now().timestamp().max(0) as u64;
        let valid = CredentialVault::check_totp_code(secret.expose_secret(), totp_code, unix_time)?;
        if !valid {
            self.log_event(
                "failed_totp_verification",
                Some(&username),
                source_addr,
                user_agent,
                SecuritySeverity::Warning,
                &[],
            )
            .await;
            return Err(AuthError::InvalidTotpCode);
        }

        let now = Utc::now();
        self.store
        .slide_session(session_token, now + ChronoDuration::hours(cookies::SESSION_LIFETIME_HOURS), true)
        .await?;
        self.store.update_user(&User { last_login: Some(now), ..user.clone() }).await?;

        self.log_event(
            "successful_totp_verification",
            Some(&username),
            source_addr,
            user_agent,
            SecuritySeverity::Info,
            &[],
        )
        .await;

        Ok(VerifiedTotp { username, password_change_required: user.password_change_required })
    }

    async fn fetch_live_session(&self, session_token: &str) -> Result<Session, AuthError> {
        let session = self.store.get_session(session_token).await?.ok_or(AuthError::SessionNotFound)?;
        if Utc::now() > session.expires_utc {
            self.store.delete_session(session_token).await?;
            return Err(AuthError::SessionExpired);
        }
        Ok(session)
    }

    /// Validates a session for a normal authenticated request and slides
    /// its expiry forward ("every authenticated request extends
    /// `expires_utc`"). Returns the validated, pre-slide session.
    pub async fn validate_session(&self, session_token: &str) -> Result<Session, AuthError> {
        let session = self.fetch_live_session(session_token).await?;
        if !session.totp_verified {
            return Err(AuthError::TotpRequired);
        }
        let user = self.store.get_user(&session.username).await?.ok_or(AuthError::SessionNotFound)?;
        if !user.enabled {
            self.store.delete_session(session_token).await?;
            return Err(AuthError::InvalidCredentials);
        }
        self.store
        .slide_session(session_token, Utc::now() + ChronoDuration::hours(cookies::SESSION_LIFETIME_HOURS), false)
        .await?;
        Ok(session)
    }

    pub async fn logout(&self, session_token: &str) -> Result<(), AuthError> {
        self.store.delete_session(session_token).await?;
        Ok(())
    }

    /// Password change invalidates every other session of the affected
    /// user. Returns how many other sessions were dropped.
    pub async fn change_password(
        &self,
        session_token: &str,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<u64, AuthError> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }
        let user = self.store.get_user(username).await?.ok_or(AuthError::InvalidCredentials)?;
        if !rfctl_crypto::verify_password(current_password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        let new_hash = rfctl_crypto::hash_password(new_password)?;
        self.store
        .update_user(&User {
                password_hash: new_hash,
                password_change_required: false,
                ..user
        })
        .await?;
        let invalidated = self.store.delete_other_sessions(username, Some(session_token)).await?;
        Ok(invalidated)
    }

    /// admin password reset. Refuses to let an admin reset their own
    /// password this way (use `change_password` instead). Invalidates
    /// *every* session of the target, including the one they're currently
    /// using, since the reset is involuntary from their perspective.
    pub async fn admin_reset_password(
        &self,
        acting_username: &str,
        target_username: &str,
    ) -> Result<String, AuthError> {
        if acting_username == target_username {
            return Err(AuthError::SelfPermissionChange);
        }
        let user = self.store.get_user(target_username).await?.ok_or(AuthError::InvalidCredentials)?;
        let new_password = rfctl_crypto::generate_session_token();
        let new_hash = rfctl_crypto::hash_password(&new_password)?;
        self.store
        .update_user(&User {
                password_hash: new_hash,
                password_change_required: true,
                ..user
        })
        .await?;
        self.store.delete_other_sessions(target_username, None).await?;
        Ok(new_password)
    }

    /// step 1 of temporary-user setup: stash a proposed password hash
    /// and a fresh (encrypted-at-rest) TOTP secret under the session token
    /// for 15 minutes, and hand back the plaintext secret once so the
    /// client can render a QR code.
    pub async fn complete_setup(
        &self,
        session_token: &str,
        issuer: &str,
        new_password: &str,
    ) -> Result<SetupStep1, AuthError> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }
        let session = self.fetch_live_session(session_token).await?;
        let user = self.store.get_user(&session.username).await?.ok_or(AuthError::SessionNotFound)?;
        if !user.is_temporary {
            return Err(AuthError::NotTemporaryUser);
        }

        let new_password_hash = rfctl_crypto::hash_password(new_password)?;
        let totp_secret = rfctl_crypto::generate_totp_secret();
        let encrypted_secret = self.vault.encrypt_totp(&totp_secret)?;
        let provisioning_uri = totp_provisioning_uri(issuer, &session.username, &totp_secret);

        self.store
        .create_pending_setup(&rfctl_store::sessions::PendingSetup {
                token: session_token.to_owned(),
                username: session.username.clone(),
                new_password_hash,
                totp_secret_encrypted: encrypted_secret,
                expires_utc: Utc::now() + ChronoDuration::minutes(PENDING_SETUP_LIFETIME_MINUTES),
        })
        .await?;

        self.log_event(
            "setup_step1_initiated",
            Some(&session.username),
            "",
            "",
            SecuritySeverity::Info,
            &[],
        )
        .await;

        Ok(SetupStep1 { totp_secret, provisioning_uri })
    }

    /// step 2: verify a code against the *pending* secret, promote the
    /// account to permanent, and discard the pending row.
    pub async fn verify_setup(&self, session_token: &str, totp_code: &str) -> Result<(), AuthError> {
        let session = self.fetch_live_session(session_token).await?;
        let pending = self
        .store
        .get_live_pending_setup(session_token)
        .await?
        .ok_or(AuthError::NoPendingSetup)?;

        let Some(secret) = self.vault.decrypt_totp(&pending.totp_secret_encrypted) else {
            return Err(AuthError::PendingSetupExpired);
        };
        let unix_time = Utc::now().timestamp().max(0) as u64;
        if !CredentialVault::check_totp_code(secret.expose_secret(), totp_code, unix_time)? {
            return Err(AuthError::InvalidTotpCode);
        }

        let user = self.store.get_user(&session.username).await?.ok_or(AuthError::SessionNotFound)?;
        let now = Utc::now();
        self.store
        .update_user(&User {
                password_hash: pending.new_password_hash,
                totp_secret_encrypted: Some(pending.totp_secret_encrypted),
                enabled: true,
                is_temporary: false,
                password_change_required: false,
                last_login: Some(now),
                ..user
        })
        .await?;
        self.store.delete_pending_setup(session_token).await?;
        self.store.slide_session(session_token, now + ChronoDuration::hours(cookies::SESSION_LIFETIME_HOURS), true).await?;

        self.log_event("setup_completed", Some(&session.username), "", "", SecuritySeverity::Info, &[]).await;

        Ok(())
    }

    /// permission gate: call after the caller's session has already
    /// been validated.
    pub fn require_permission(user: &User, permission: Permission) -> Result<(), AuthError> {
        if user.has_permission(permission) {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied(permission.as_str()))
        }
    }

    /// Permission changes on yourself that would lock you out are refused
    /// outright: a flat refusal to touch your own permission grants at all.
    pub fn refuse_self_permission_change(acting_username: &str, target_username: &str) -> Result<(), AuthError> {
        if acting_username == target_username {
            Err(AuthError::SelfPermissionChange)
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn cookie_policy(&self, request_is_https: bool, forwarded_proto: Option<&str>) -> CookiePolicy {
        CookiePolicy::detect(request_is_https, forwarded_proto)
    }
}

/// `otpauth://totp/{issuer}:{username}?secret=...&issuer=...`, the standard
/// key-URI format authenticator apps expect for TOTP enrollment.
#[must_use]
pub fn totp_provisioning_uri(issuer: &str, username: &str, secret: &str) -> String {
    format!("otpauth://totp/{issuer}:{username}?secret={secret}&issuer={issuer}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfctl_crypto::parse_master_key;
    use rfctl_store::test_store;

    async fn gateway() -> (AuthGateway, Arc<Store>) {
        let store = Arc::new(test_store().await);
        let vault = Arc::new(CredentialVault::new(parse_master_key(&"11".repeat(32)).unwrap()));
        (AuthGateway::new(store.clone(), vault), store)
    }

    async fn seed_user(store: &Store, username: &str, password: &str) {
        store
        .create_user(&User {
                username: username.to_owned(),
                password_hash: rfctl_crypto::hash_password(password).unwrap(),
                totp_secret_encrypted: None,
                enabled: true,
                is_temporary: false,
                password_change_required: false,
                permissions: Vec::new(),
                created_at: Utc::now(),
                last_login: None,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn login_without_totp_is_immediately_authenticated() {
        let (gw, store) = gateway().await;
        seed_user(&store, "alice", "correct horse battery staple").await;
        let result = gw.login("1.2.3.4", "curl", "alice", "correct horse battery staple").await.unwrap();
        assert!(matches!(result.status, LoginStatus::Authenticated {.. }));
        let session = store.get_session(&result.session_token).await.unwrap().unwrap();
        assert!(session.totp_verified);
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_rejected() {
        let (gw, store) = gateway().await;
        seed_user(&store, "alice", "correct horse battery staple").await;
        let err = gw.login("1.2.3.4", "curl", "alice", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_for_nonexistent_user_is_rejected_with_the_same_error() {
        let (gw, _store) = gateway().await;
        let err = gw.login("1.2.3.4", "curl", "ghost", "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn sixth_login_attempt_in_window_is_rate_limited() {
        let (gw, store) = gateway().await;
        seed_user(&store, "alice", "correct horse battery staple").await;
        for _ in 0..5 {
            let _ = gw.login("9.9.9.9", "curl", "alice", "wrong").await;
        }
        let err = gw.login("9.9.9.9", "curl", "alice", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::RateLimited(_)));
    }

    #[tokio::test]
    async fn temporary_disabled_user_can_still_log_in_to_reach_setup() {
        let (gw, store) = gateway().await;
        store.bootstrap_if_empty().await.unwrap();
        // bootstrap_if_empty doesn't expose the plaintext password to us
        // here, so seed a second temporary account directly instead.
        store
        .create_user(&User {
                username: "temp".to_owned(),
                password_hash: rfctl_crypto::hash_password("tmp-password").unwrap(),
                totp_secret_encrypted: None,
                enabled: false,
                is_temporary: true,
                password_change_required: true,
                permissions: Vec::new(),
                created_at: Utc::now(),
                last_login: None,
        })
        .await
        .unwrap();
        let result = gw.login("1.2.3.4", "curl", "temp", "tmp-password").await.unwrap();
        assert_eq!(result.status, LoginStatus::SetupRequired);
    }

    #[tokio::test]
    async fn permanently_disabled_user_cannot_log_in() {
        let (gw, store) = gateway().await;
        store
        .create_user(&User {
                username: "disabled".to_owned(),
                password_hash: rfctl_crypto::hash_password("pw12345678").unwrap(),
                totp_secret_encrypted: None,
                enabled: false,
                is_temporary: false,
                password_change_required: false,
                permissions: Vec::new(),
                created_at: Utc::now(),
                last_login: None,
        })
        .await
        .unwrap();
        let err = gw.login("1.2.3.4", "curl", "disabled", "pw12345678").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn change_password_invalidates_other_sessions_only() {
        let (gw, store) = gateway().await;
        seed_user(&store, "alice", "correct horse battery staple").await;
        let first = gw.login("1.2.3.4", "curl", "alice", "correct horse battery staple").await.unwrap();
        let second = gw.login("1.2.3.5", "curl", "alice", "correct horse battery staple").await.unwrap();

        let invalidated = gw
        .change_password(&first.session_token, "alice", "correct horse battery staple", "new password 123")
        .await
        .unwrap();
        assert_eq!(invalidated, 1);
        assert!(store.get_session(&first.session_token).await.unwrap().is_some());
        assert!(store.get_session(&second.session_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn admin_cannot_reset_their_own_password() {
        let (gw, store) = gateway().await;
        seed_user(&store, "alice", "correct horse battery staple").await;
        let err = gw.admin_reset_password("alice", "alice").await.unwrap_err();
        assert!(matches!(err, AuthError::SelfPermissionChange));
    }

    #[tokio::test]
    async fn admin_reset_password_invalidates_all_sessions_and_requires_change() {
        let (gw, store) = gateway().await;
        seed_user(&store, "alice", "correct horse battery staple").await;
        seed_user(&store, "admin2", "whatever password here").await;
        let session = gw.login("1.2.3.4", "curl", "alice", "correct horse battery staple").await.unwrap();

        gw.admin_reset_password("admin2", "alice").await.unwrap();

        assert!(store.get_session(&session.session_token).await.unwrap().is_none());
        let user = store.get_user("alice").await.unwrap().unwrap();
        assert!(user.password_change_required);
    }

    #[tokio::test]
    async fn require_permission_rejects_when_missing() {
        let user = User {
            username: "bob".to_owned(),
            password_hash: String::new(),
            totp_secret_encrypted: None,
            enabled: true,
            is_temporary: false,
            password_change_required: false,
            permissions: vec![],
            created_at: Utc::now(),
            last_login: None,
        };
        let err = AuthGateway::require_permission(&user, Permission::CreateUsers).unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied("create_users")));
    }

    #[tokio::test]
    async fn full_setup_flow_promotes_temporary_user() {
        let (gw, store) = gateway().await;
        store
        .create_user(&User {
                username: "newbie".to_owned(),
                password_hash: rfctl_crypto::hash_password("temp-pw-123").unwrap(),
                totp_secret_encrypted: None,
                enabled: false,
                is_temporary: true,
                password_change_required: true,
                permissions: Vec::new(),
                created_at: Utc::now(),
                last_login: None,
        })
        .await
        .unwrap();
        let login = gw.login("1.2.3.4", "curl", "newbie", "temp-pw-123").await.unwrap();
        assert_eq!(login.status, LoginStatus::SetupRequired);

        let step1 = gw.complete_setup(&login.session_token, "TestCTF", "brand new password!").await.unwrap();
        assert!(step1.provisioning_uri.contains("newbie"));

        let totp = totp_rs::TOTP::new(totp_rs::Algorithm::SHA1, 6, 1, 30, step1.totp_secret.as_bytes().to_vec())
        .unwrap();
        let code = totp.generate(Utc::now().timestamp() as u64);

        gw.verify_setup(&login.session_token, &code).await.unwrap();

        let user = store.get_user("newbie").await.unwrap().unwrap();
        assert!(user.enabled);
        assert!(!user.is_temporary);
        assert!(user.has_totp());
        assert!(store.get_live_pending_setup(&login.session_token).await.unwrap().is_none());
    }
}
