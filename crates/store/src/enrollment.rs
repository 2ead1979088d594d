use chrono::{DateTime, Utc};
use rfctl_model::{EnrollmentToken, ProvisioningKey};
use sqlx::FromRow;

use crate::{Store, StoreError};

#[derive(FromRow)]
struct EnrollmentTokenRow {
    token: String,
    runner_name: String,
    created_by: String,
    expires_utc: DateTime<Utc>,
    used: bool,
    used_at: Option<DateTime<Utc>>,
    used_by_runner_id: Option<String>,
    re_enrollment_for: Option<String>,
}

impl From<EnrollmentTokenRow> for EnrollmentToken {
    fn from(row: EnrollmentTokenRow) -> Self {
        EnrollmentToken {
            token: row.token,
            runner_name: row.runner_name,
            created_by: row.created_by,
            expires_utc: row.expires_utc,
            used: row.used,
            used_at: row.used_at,
            used_by_runner_id: row.used_by_runner_id,
            re_enrollment_for: row.re_enrollment_for,
        }
    }
}

#[derive(FromRow)]
struct ProvisioningKeyRow {
    key_id: String,
    api_key_hash: String,
    description: String,
    created_by: String,
    enabled: bool,
    created_at: DateTime<Utc>,
}

impl From<ProvisioningKeyRow> for ProvisioningKey {
    fn from(row: ProvisioningKeyRow) -> Self {
        ProvisioningKey {
            key_id: row.key_id,
            api_key_hash: row.api_key_hash,
            description: row.description,
            created_by: row.created_by,
            enabled: row.enabled,
            created_at: row.created_at,
        }
    }
}

impl Store {
    pub async fn create_enrollment_token(&self, tok: &EnrollmentToken) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO enrollment_tokens
            (token, runner_name, created_by, expires_utc, used, used_at,
                used_by_runner_id, re_enrollment_for)
            VALUES (?, ?, ?, ?, 0, NULL, NULL, ?)",
        )
        .bind(&tok.token)
        .bind(&tok.runner_name)
        .bind(&tok.created_by)
        .bind(tok.expires_utc)
        .bind(&tok.re_enrollment_for)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_enrollment_token(
        &self,
        token: &str,
    ) -> Result<Option<EnrollmentToken>, StoreError> {
        let row: Option<EnrollmentTokenRow> =
        sqlx::query_as("SELECT * FROM enrollment_tokens WHERE token = ?")
        .bind(token)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(EnrollmentToken::from))
    }

    pub async fn list_enrollment_tokens(&self) -> Result<Vec<EnrollmentToken>, StoreError> {
        let rows: Vec<EnrollmentTokenRow> =
        sqlx::query_as("SELECT * FROM enrollment_tokens ORDER BY expires_utc DESC")
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(EnrollmentToken::from).collect())
    }

    /// Atomically mark a live, unused token as used. Returns `false` (no
    /// row changed) if the token was already used, expired, or missing —
    /// the one-shot invariant ("may transition used: false → true
    /// exactly once").
    pub async fn consume_enrollment_token(
        &self,
        token: &str,
        used_by_runner_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE enrollment_tokens
            SET used = 1, used_at = ?, used_by_runner_id = ?
            WHERE token = ? AND used = 0 AND expires_utc > ?",
        )
        .bind(Utc::now())
        .bind(used_by_runner_id)
        .bind(token)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_enrollment_token(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM enrollment_tokens WHERE token = ?")
        .bind(token)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn cleanup_expired_tokens(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM enrollment_tokens WHERE used = 0 AND expires_utc < ?",
        )
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn create_provisioning_key(&self, key: &ProvisioningKey) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO provisioning_keys
            (key_id, api_key_hash, description, created_by, enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&key.key_id)
        .bind(&key.api_key_hash)
        .bind(&key.description)
        .bind(&key.created_by)
        .bind(key.enabled)
        .bind(key.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_provisioning_keys(&self) -> Result<Vec<ProvisioningKey>, StoreError> {
        let rows: Vec<ProvisioningKeyRow> =
        sqlx::query_as("SELECT * FROM provisioning_keys ORDER BY created_at DESC")
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(ProvisioningKey::from).collect())
    }

    /// Enabled provisioning keys, for the caller to run a constant-time
    /// bcrypt check against the presented bearer token.
    pub async fn enabled_provisioning_keys(&self) -> Result<Vec<ProvisioningKey>, StoreError> {
        let rows: Vec<ProvisioningKeyRow> =
        sqlx::query_as("SELECT * FROM provisioning_keys WHERE enabled = 1")
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(ProvisioningKey::from).collect())
    }

    pub async fn set_provisioning_key_enabled(
        &self,
        key_id: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE provisioning_keys SET enabled = ? WHERE key_id = ?")
        .bind(enabled)
        .bind(key_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("provisioning_key"));
        }
        Ok(())
    }

    pub async fn delete_provisioning_key(&self, key_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM provisioning_keys WHERE key_id = ?")
        .bind(key_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("provisioning_key"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;

    fn sample_token(tok: &str) -> EnrollmentToken {
        EnrollmentToken {
            token: tok.to_owned(),
            runner_name: "runner-x".to_owned(),
            created_by: "admin".to_owned(),
            expires_utc: Utc::now() + chrono::Duration::hours(24),
            used: false,
            used_at: None,
            used_by_runner_id: None,
            re_enrollment_for: None,
        }
    }

    #[tokio::test]
    async fn consume_is_one_shot() {
        let store = test_store().await;
        store.create_enrollment_token(&sample_token("tok-a")).await.unwrap();
        assert!(store.consume_enrollment_token("tok-a", "runner-x").await.unwrap());
        assert!(!store.consume_enrollment_token("tok-a", "runner-x").await.unwrap());
    }

    #[tokio::test]
    async fn consume_rejects_expired_token() {
        let store = test_store().await;
        let mut tok = sample_token("tok-b");
        tok.expires_utc = Utc::now() - chrono::Duration::minutes(1);
        store.create_enrollment_token(&tok).await.unwrap();
        assert!(!store.consume_enrollment_token("tok-b", "runner-x").await.unwrap());
    }

    #[tokio::test]
    async fn provisioning_key_enable_disable() {
        let store = test_store().await;
        let key = ProvisioningKey {
            key_id: "key-1".to_owned(),
            api_key_hash: "hash".to_owned(),
            description: "ci runner fleet".to_owned(),
            created_by: "admin".to_owned(),
            enabled: true,
            created_at: Utc::now(),
        };
        store.create_provisioning_key(&key).await.unwrap();
        assert_eq!(store.enabled_provisioning_keys().await.unwrap().len(), 1);
        store.set_provisioning_key_enabled("key-1", false).await.unwrap();
        assert_eq!(store.enabled_provisioning_keys().await.unwrap().len(), 0);
    }
}
