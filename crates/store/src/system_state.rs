use rfctl_model::SystemStateKey;

use crate::{Store, StoreError};

impl Store {
    pub async fn get_state(&self, key: SystemStateKey) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM system_state WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn get_bool_state(&self, key: SystemStateKey) -> Result<bool, StoreError> {
        Ok(self
            .get_state(key)
            .await?
            .is_some_and(|v| v == "true" || v == "1"))
    }

    pub async fn set_state(&self, key: SystemStateKey, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO system_state (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key.as_str())
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_bool_state(&self, key: SystemStateKey, value: bool) -> Result<(), StoreError> {
        self.set_state(key, if value { "true" } else { "false" }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;

    #[tokio::test]
    async fn bool_state_roundtrips() {
        let store = test_store().await;
        assert!(!store.get_bool_state(SystemStateKey::Paused).await.unwrap());
        store.set_bool_state(SystemStateKey::Paused, true).await.unwrap();
        assert!(store.get_bool_state(SystemStateKey::Paused).await.unwrap());
    }

    #[tokio::test]
    async fn set_state_overwrites_existing_value() {
        let store = test_store().await;
        store.set_state(SystemStateKey::DayStart, "08:00").await.unwrap();
        store.set_state(SystemStateKey::DayStart, "09:30").await.unwrap();
        assert_eq!(
            store.get_state(SystemStateKey::DayStart).await.unwrap().as_deref(),
            Some("09:30")
        );
    }
}
