use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sliding session token. Usable only while
/// `now < expires_utc && totp_verified` (temporary-user setup sessions are
/// the one exception, gated separately by the auth layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub expires_utc: DateTime<Utc>,
    pub totp_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.totp_verified && now < self.expires_utc
    }
}
