use serde::{Deserialize, Serialize};

/// A granted capability string attached to a user.
///
/// The permission set is intentionally small and additive: holding a
/// permission never restricts what a user could otherwise do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    CreateUsers,
    CreateProvisioningKey,
}

impl Permission {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateUsers => "create_users",
            Self::CreateProvisioningKey => "create_provisioning_key",
        }
    }

    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "create_users" => Some(Self::CreateUsers),
            "create_provisioning_key" => Some(Self::CreateProvisioningKey),
            _ => None,
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
