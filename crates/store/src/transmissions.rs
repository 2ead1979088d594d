use chrono::{DateTime, Utc};
use rfctl_model::{Transmission, TransmissionStatus};
use sqlx::FromRow;

use crate::{Store, StoreError};

#[derive(FromRow)]
struct TransmissionRow {
    id: String,
    challenge_id: String,
    runner_id: String,
    device_id: Option<String>,
    frequency_hz: i64,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    status: String,
    error_message: Option<String>,
}

impl From<TransmissionRow> for Transmission {
    fn from(row: TransmissionRow) -> Self {
        let status = match row.status.as_str() {
            "success" => TransmissionStatus::Success,
            "failed" => TransmissionStatus::Failed,
            _ => TransmissionStatus::Transmitting,
        };
        Transmission {
            id: row.id,
            challenge_id: row.challenge_id,
            runner_id: row.runner_id,
            device_id: row.device_id,
            frequency_hz: row.frequency_hz as u64,
            started_at: row.started_at,
            completed_at: row.completed_at,
            status,
            error_message: row.error_message,
        }
    }
}

impl Store {
    /// Append-only: one row per runner transmission attempt.
    pub async fn create_transmission(&self, tx: &Transmission) -> Result<(), StoreError> {
        let status = match tx.status {
            TransmissionStatus::Transmitting => "transmitting",
            TransmissionStatus::Success => "success",
            TransmissionStatus::Failed => "failed",
        };
        sqlx::query(
            "INSERT INTO transmissions
            (id, challenge_id, runner_id, device_id, frequency_hz, started_at,
                completed_at, status, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&tx.id)
        .bind(&tx.challenge_id)
        .bind(&tx.runner_id)
        .bind(&tx.device_id)
        .bind(tx.frequency_hz as i64)
        .bind(tx.started_at)
        .bind(tx.completed_at)
        .bind(status)
        .bind(&tx.error_message)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn complete_transmission(
        &self,
        id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let status = if success { "success" } else { "failed" };
        let result = sqlx::query(
            "UPDATE transmissions SET completed_at = ?, status = ?, error_message = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(status)
        .bind(error_message)
        .bind(id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("transmission"));
        }
        Ok(())
    }

    pub async fn get_transmission(&self, id: &str) -> Result<Option<Transmission>, StoreError> {
        let row: Option<TransmissionRow> =
        sqlx::query_as("SELECT * FROM transmissions WHERE id = ?")
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Transmission::from))
    }

    pub async fn list_transmissions(&self, limit: i64) -> Result<Vec<Transmission>, StoreError> {
        let rows: Vec<TransmissionRow> = sqlx::query_as(
            "SELECT * FROM transmissions ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Transmission::from).collect())
    }

    pub async fn list_transmissions_for_challenge(
        &self,
        challenge_id: &str,
    ) -> Result<Vec<Transmission>, StoreError> {
        let rows: Vec<TransmissionRow> = sqlx::query_as(
            "SELECT * FROM transmissions WHERE challenge_id = ? ORDER BY started_at DESC",
        )
        .bind(challenge_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Transmission::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;
    use uuid::Uuid;

    fn sample_tx() -> Transmission {
        Transmission {
            id: Uuid::new_v4().to_string(),
            challenge_id: "c-1".to_owned(),
            runner_id: "runner-1".to_owned(),
            device_id: None,
            frequency_hz: 7_050_000,
            started_at: Utc::now(),
            completed_at: None,
            status: TransmissionStatus::Transmitting,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn create_then_complete_roundtrips() {
        let store = test_store().await;
        let tx = sample_tx();
        store.create_transmission(&tx).await.unwrap();
        store.complete_transmission(&tx.id, true, None).await.unwrap();
        let fetched = store.get_transmission(&tx.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TransmissionStatus::Success);
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn list_for_challenge_filters() {
        let store = test_store().await;
        let mut tx_a = sample_tx();
        tx_a.challenge_id = "c-1".to_owned();
        let mut tx_b = sample_tx();
        tx_b.challenge_id = "c-2".to_owned();
        store.create_transmission(&tx_a).await.unwrap();
        store.create_transmission(&tx_b).await.unwrap();
        let for_c1 = store.list_transmissions_for_challenge("c-1").await.unwrap();
        assert_eq!(for_c1.len(), 1);
        assert_eq!(for_c1[0].id, tx_a.id);
    }
}
