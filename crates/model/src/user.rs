use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::permission::Permission;

/// A controller account. Temporary until password+TOTP setup is completed
/// within 24h of creation (Invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    /// AES-256-GCM envelope, present only once TOTP has been configured.
    pub totp_secret_encrypted: Option<String>,
    pub enabled: bool,
    pub is_temporary: bool,
    pub password_change_required: bool,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    #[must_use]
    pub fn has_totp(&self) -> bool {
        self.totp_secret_encrypted.is_some()
    }

    #[must_use]
    pub fn has_permission(&self, p: Permission) -> bool {
        self.permissions.contains(&p)
    }

    /// True once the 24h temporary-account deadline has passed.
    #[must_use]
    pub fn setup_deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.is_temporary && now - self.created_at > chrono::Duration::hours(24)
    }
}
