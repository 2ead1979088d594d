use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One-shot credential that converts into a runner API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentToken {
    pub token: String,
    pub runner_name: String,
    pub created_by: String,
    pub expires_utc: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by_runner_id: Option<String>,
    /// Set when this token re-binds credentials for an existing runner id
    /// onto a replacement host, rather than enrolling a brand new one.
    pub re_enrollment_for: Option<String>,
}

impl EnrollmentToken {
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_utc
    }
}

/// Long-lived credential that can mint enrollment tokens + runner API keys,
/// without otherwise reading or writing controller state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningKey {
    pub key_id: String,
    pub api_key_hash: String,
    pub description: String,
    pub created_by: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}
