use std::time::Duration;

use thiserror::Error;

/// Failures raised by `rfctl-auth` operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Store(#[from] rfctl_store::StoreError),

    #[error(transparent)]
    Crypto(#[from] rfctl_crypto::CryptoError),

    /// Username/password didn't match, the account is disabled, or the
    /// account doesn't exist. Collapsed into one variant deliberately so
    /// the HTTP layer returns the same generic message for all three and
    /// doesn't leak which one occurred.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("no session found for that token")]
    SessionNotFound,

    #[error("session has expired")]
    SessionExpired,

    #[error("TOTP verification is required to complete this session")]
    TotpRequired,

    #[error("invalid TOTP code")]
    InvalidTotpCode,

    #[error("TOTP code has already been used")]
    TotpReplay,

    #[error("too many attempts, retry after {0:?}")]
    RateLimited(Duration),

    #[error("CSRF token missing or did not match")]
    CsrfMismatch,

    #[error("permission denied: {0} required")]
    PermissionDenied(&'static str),

    #[error("refusing to modify your own permissions")]
    SelfPermissionChange,

    #[error("no pending setup found for this session")]
    NoPendingSetup,

    #[error("pending setup has expired, restart the setup process")]
    PendingSetupExpired,

    #[error("this endpoint is only for temporary users")]
    NotTemporaryUser,

    #[error("new password must be at least 8 characters")]
    PasswordTooShort,
}
