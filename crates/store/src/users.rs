use chrono::{DateTime, Utc};
use rfctl_model::{Permission, User};
use sqlx::FromRow;

use crate::{Store, StoreError};

#[derive(FromRow)]
struct UserRow {
    username: String,
    password_hash: String,
    totp_secret_encrypted: Option<String>,
    enabled: bool,
    is_temporary: bool,
    password_change_required: bool,
    permissions: String,
    created_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let raw_perms: Vec<String> = serde_json::from_str(&row.permissions)?;
        let permissions = raw_perms
        .iter().filter_map(|s| Permission::from_str_loose(s))
        .collect();
        Ok(User {
                username: row.username,
                password_hash: row.password_hash,
                totp_secret_encrypted: row.totp_secret_encrypted,
                enabled: row.enabled,
                is_temporary: row.is_temporary,
                password_change_required: row.password_change_required,
                permissions,
                created_at: row.created_at,
                last_login: row.last_login,
        })
    }
}

fn permissions_json(user: &User) -> String {
    let names: Vec<&str> = user.permissions.iter().map(|p| p.as_str()).collect();
    serde_json::to_string(&names).expect("permission list serializes")
}

impl Store {
    /// Insert a brand-new user. Fails with [`StoreError::Conflict`] if the
    /// username already exists.
    pub async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO users
            (username, password_hash, totp_secret_encrypted, enabled, is_temporary,
                password_change_required, permissions, created_at, last_login)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.totp_secret_encrypted)
        .bind(user.enabled)
        .bind(user.is_temporary)
        .bind(user.password_change_required)
        .bind(permissions_json(user))
        .bind(user.created_at)
        .bind(user.last_login)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict("user"));
        }
        Ok(())
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(self.pool())
        .await?;
        row.map(User::try_from).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users ORDER BY username")
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    /// `true` iff no user rows exist yet (drives the bootstrap hook).
    pub async fn users_exist(&self) -> Result<bool, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(self.pool())
        .await?;
        Ok(count > 0)
    }

    pub async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET
            password_hash = ?, totp_secret_encrypted = ?, enabled = ?, is_temporary = ?,
            password_change_required = ?, permissions = ?, last_login = ?
            WHERE username = ?",
        )
        .bind(&user.password_hash)
        .bind(&user.totp_secret_encrypted)
        .bind(user.enabled)
        .bind(user.is_temporary)
        .bind(user.password_change_required)
        .bind(permissions_json(user))
        .bind(user.last_login)
        .bind(&user.username)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    pub async fn delete_user(&self, username: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?")
        .bind(username)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    /// Users whose temporary-setup deadline (24h after creation) has
    /// passed, for the periodic stale-account sweep.
    pub async fn temporary_users_past_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<User>, StoreError> {
        let cutoff = now - chrono::Duration::hours(24);
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT * FROM users WHERE is_temporary = 1 AND created_at < ?",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    /// `reap_stale_temporary_users`: any temporary account past its 24h
    /// setup deadline is disabled so it can no longer authenticate.
    /// Returns the usernames disabled.
    pub async fn reap_stale_temporary_users(&self) -> Result<Vec<String>, StoreError> {
        let stale = self.temporary_users_past_deadline(Utc::now()).await?;
        let mut disabled = Vec::with_capacity(stale.len());
        for mut user in stale {
            if !user.enabled {
                continue;
            }
            user.enabled = false;
            self.update_user(&user).await?;
            disabled.push(user.username);
        }
        Ok(disabled)
    }
}
