use serde::Deserialize;

/// Login/verify-TOTP rate-limit tier ("5 per 15 minutes").
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LoginTierConfig {
    #[serde(default = "default_requests")]
    pub requests_per_window: u32,
    #[serde(default = "default_window_secs")]
    pub window_seconds: u64,
}

impl Default for LoginTierConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests(),
            window_seconds: default_window_secs(),
        }
    }
}

fn default_requests() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    15 * 60
}

/// Admin mutation rate limit ("100/min, 1000/h" — both windows apply at
/// once).
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct AdminMutationsConfig {
    #[serde(default = "default_admin_per_minute")]
    pub per_minute: u32,
    #[serde(default = "default_admin_per_hour")]
    pub per_hour: u32,
}

impl Default for AdminMutationsConfig {
    fn default() -> Self {
        Self {
            per_minute: default_admin_per_minute(),
            per_hour: default_admin_per_hour(),
        }
    }
}

fn default_admin_per_minute() -> u32 {
    100
}

fn default_admin_per_hour() -> u32 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// TOTP issuer name embedded in the provisioning URI.
    #[serde(default = "default_issuer")]
    pub totp_issuer: String,
    #[serde(default)]
    pub login: LoginTierConfig,
    #[serde(default)]
    pub admin_mutations: AdminMutationsConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            totp_issuer: default_issuer(),
            login: LoginTierConfig::default(),
            admin_mutations: AdminMutationsConfig::default(),
        }
    }
}

fn default_issuer() -> String {
    "rfctl".to_owned()
}
