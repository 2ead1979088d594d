use chrono::{DateTime, Utc};
use rfctl_model::Session;
use sqlx::FromRow;

use crate::{Store, StoreError};

#[derive(FromRow)]
struct SessionRow {
    token: String,
    username: String,
    expires_utc: DateTime<Utc>,
    totp_verified: bool,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            token: row.token,
            username: row.username,
            expires_utc: row.expires_utc,
            totp_verified: row.totp_verified,
            created_at: row.created_at,
        }
    }
}

/// A pending two-step setup record ("Two-step setup for temporary
/// users"): proposed credentials stashed under the session token for up to
/// 15 minutes while the user completes TOTP verification.
#[derive(Debug, Clone)]
pub struct PendingSetup {
    pub token: String,
    pub username: String,
    pub new_password_hash: String,
    pub totp_secret_encrypted: String,
    pub expires_utc: DateTime<Utc>,
}

#[derive(FromRow)]
struct PendingSetupRow {
    token: String,
    username: String,
    new_password_hash: String,
    totp_secret_encrypted: String,
    expires_utc: DateTime<Utc>,
}

impl From<PendingSetupRow> for PendingSetup {
    fn from(row: PendingSetupRow) -> Self {
        PendingSetup {
            token: row.token,
            username: row.username,
            new_password_hash: row.new_password_hash,
            totp_secret_encrypted: row.totp_secret_encrypted,
            expires_utc: row.expires_utc,
        }
    }
}

impl Store {
    pub async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (token, username, expires_utc, totp_verified, created_at)
            VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(&session.username)
        .bind(session.expires_utc)
        .bind(session.totp_verified)
        .bind(session.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM sessions WHERE token = ?")
        .bind(token)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Session::from))
    }

    /// Slide a session's expiry forward (every authenticated request
    /// extends `expires_utc` to `now + 24h`), and optionally flip
    /// `totp_verified` on (never off — TOTP verification is one-way).
    pub async fn slide_session(
        &self,
        token: &str,
        new_expiry: DateTime<Utc>,
        mark_totp_verified: bool,
    ) -> Result<(), StoreError> {
        let result = if mark_totp_verified {
            sqlx::query(
                "UPDATE sessions SET expires_utc = ?, totp_verified = 1 WHERE token = ?",
            )
            .bind(new_expiry)
            .bind(token)
            .execute(self.pool())
            .await?
        } else {
            sqlx::query("UPDATE sessions SET expires_utc = ? WHERE token = ?")
            .bind(new_expiry)
            .bind(token)
            .execute(self.pool())
            .await?
        };
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("session"));
        }
        Ok(())
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Delete every session for `username` except `keep_token`, used by
    /// password change / admin reset ("invalidate every other
    /// session of the affected user").
    pub async fn delete_other_sessions(
        &self,
        username: &str,
        keep_token: Option<&str>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE username = ? AND token != ?")
        .bind(username)
        .bind(keep_token.unwrap_or(""))
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_utc < ?")
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn create_pending_setup(&self, pending: &PendingSetup) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO pending_setups
            (token, username, new_password_hash, totp_secret_encrypted, expires_utc)
            VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&pending.token)
        .bind(&pending.username)
        .bind(&pending.new_password_hash)
        .bind(&pending.totp_secret_encrypted)
        .bind(pending.expires_utc)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch a pending setup only if it hasn't expired yet.
    pub async fn get_live_pending_setup(
        &self,
        token: &str,
    ) -> Result<Option<PendingSetup>, StoreError> {
        let row: Option<PendingSetupRow> = sqlx::query_as(
            "SELECT * FROM pending_setups WHERE token = ? AND expires_utc > ?",
        )
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(PendingSetup::from))
    }

    pub async fn delete_pending_setup(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pending_setups WHERE token = ?")
        .bind(token)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;

    fn sample_session(token: &str) -> Session {
        Session {
            token: token.to_owned(),
            username: "alice".to_owned(),
            expires_utc: Utc::now() + chrono::Duration::hours(24),
            totp_verified: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_then_fetch_roundtrips() {
        let store = test_store().await;
        store.create_session(&sample_session("tok1")).await.unwrap();
        let fetched = store.get_session("tok1").await.unwrap().unwrap();
        assert_eq!(fetched.username, "alice");
        assert!(fetched.totp_verified);
    }

    #[tokio::test]
    async fn slide_extends_expiry() {
        let store = test_store().await;
        store.create_session(&sample_session("tok2")).await.unwrap();
        let new_expiry = Utc::now() + chrono::Duration::hours(48);
        store.slide_session("tok2", new_expiry, false).await.unwrap();
        let fetched = store.get_session("tok2").await.unwrap().unwrap();
        assert!((fetched.expires_utc - new_expiry).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn delete_other_sessions_keeps_current() {
        let store = test_store().await;
        store.create_session(&sample_session("keep")).await.unwrap();
        store.create_session(&sample_session("drop")).await.unwrap();
        let removed = store
        .delete_other_sessions("alice", Some("keep"))
        .await
        .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_session("keep").await.unwrap().is_some());
        assert!(store.get_session("drop").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_expired_removes_only_past_sessions() {
        let store = test_store().await;
        let mut expired = sample_session("expired");
        expired.expires_utc = Utc::now() - chrono::Duration::minutes(1);
        store.create_session(&expired).await.unwrap();
        store.create_session(&sample_session("live")).await.unwrap();
        let removed = store.cleanup_expired_sessions().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_session("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn pending_setup_roundtrips_and_expires() {
        let store = test_store().await;
        let pending = PendingSetup {
            token: "setup-tok".to_owned(),
            username: "temp-user".to_owned(),
            new_password_hash: "hash".to_owned(),
            totp_secret_encrypted: "ENC[AES256-GCM,data:a,iv:b,tag:c]".to_owned(),
            expires_utc: Utc::now() + chrono::Duration::minutes(15),
        };
        store.create_pending_setup(&pending).await.unwrap();
        let fetched = store.get_live_pending_setup("setup-tok").await.unwrap();
        assert!(fetched.is_some());
        store.delete_pending_setup("setup-tok").await.unwrap();
        assert!(store.get_live_pending_setup("setup-tok").await.unwrap().is_none());
    }
}
