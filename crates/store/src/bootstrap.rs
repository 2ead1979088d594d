use chrono::Utc;
use rand::Rng;
use rfctl_model::{SystemStateKey, User};

use crate::{Store, StoreError};

const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";

/// Username of the disabled account `bootstrap_if_empty` creates on a fresh
/// install. Exposed so the initial-setup flow can disable it once a real
/// admin has been created.
pub const BOOTSTRAP_USERNAME: &str = "admin";

fn random_password(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
    .map(|_| {
            let idx = rng.gen_range(0..PASSWORD_ALPHABET.len());
            PASSWORD_ALPHABET[idx] as char
    })
    .collect()
}

impl Store {
    /// initial-bootstrap hook: if no users exist, create a disabled
    /// default user with a printed random password and set
    /// `initial_setup_required=true`. Returns the plaintext password so the
    /// caller can print it to the operator console exactly once; it is
    /// never stored or logged anywhere else.
    pub async fn bootstrap_if_empty(&self) -> Result<Option<String>, StoreError> {
        if self.users_exist().await? {
            return Ok(None);
        }

        let password = random_password(20);
        let password_hash = rfctl_crypto::hash_password(&password)?;

        let user = User {
            username: BOOTSTRAP_USERNAME.to_owned(),
            password_hash,
            totp_secret_encrypted: None,
            enabled: false,
            is_temporary: true,
            password_change_required: true,
            permissions: Vec::new(),
            created_at: Utc::now(),
            last_login: None,
        };
        self.create_user(&user).await?;
        self.set_bool_state(SystemStateKey::InitialSetupRequired, true)
        .await?;

        Ok(Some(password))
    }

    /// One-shot migration: re-encrypt any user row whose
    /// `totp_secret_encrypted` is present but not already an `ENC[...]`
    /// envelope. Returns the usernames that were migrated.
    pub async fn migrate_legacy_totp_secrets(
        &self,
        vault: &rfctl_crypto::CredentialVault,
    ) -> Result<Vec<String>, StoreError> {
        let mut migrated = Vec::new();
        for mut user in self.list_users().await? {
            let Some(stored) = user.totp_secret_encrypted.clone() else {
                continue;
            };
            if let Some(reencrypted) = vault.migrate_legacy_totp_secret(&stored) {
                user.totp_secret_encrypted = Some(reencrypted);
                self.update_user(&user).await?;
                migrated.push(user.username);
            }
        }
        Ok(migrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;

    #[tokio::test]
    async fn bootstrap_creates_disabled_admin_once() {
        let store = test_store().await;
        let password = store.bootstrap_if_empty().await.unwrap();
        assert!(password.is_some());
        assert_eq!(password.unwrap().len(), 20);

        let user = store.get_user(BOOTSTRAP_USERNAME).await.unwrap().unwrap();
        assert!(!user.enabled);
        assert!(user.is_temporary);
        assert!(store
            .get_bool_state(SystemStateKey::InitialSetupRequired)
            .await
            .unwrap());

        // Second call is a no-op since a user now exists.
        assert!(store.bootstrap_if_empty().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn migrate_legacy_totp_secrets_only_touches_plain_rows() {
        let store = test_store().await;
        let key = rfctl_crypto::parse_master_key(&"42".repeat(32)).unwrap();
        let vault = rfctl_crypto::CredentialVault::new(key);

        let mut legacy = User {
            username: "legacy".to_owned(),
            password_hash: "hash".to_owned(),
            totp_secret_encrypted: Some("JBSWY3DPEHPK3PXP".to_owned()),
            enabled: true,
            is_temporary: false,
            password_change_required: false,
            permissions: Vec::new(),
            created_at: Utc::now(),
            last_login: None,
        };
        store.create_user(&legacy).await.unwrap();

        let already_encrypted_secret = vault.encrypt_totp("JBSWY3DPEHPK3PXP").unwrap();
        legacy.username = "modern".to_owned();
        legacy.totp_secret_encrypted = Some(already_encrypted_secret.clone());
        store.create_user(&legacy).await.unwrap();

        let migrated = store.migrate_legacy_totp_secrets(&vault).await.unwrap();
        assert_eq!(migrated, vec!["legacy".to_owned()]);

        let modern = store.get_user("modern").await.unwrap().unwrap();
        assert_eq!(
            modern.totp_secret_encrypted.as_deref(),
            Some(already_encrypted_secret.as_str())
        );
    }
}
