use chrono::{DateTime, Utc};
use rfctl_model::Recording;
use sqlx::FromRow;

use crate::{Store, StoreError};

#[derive(FromRow)]
struct RecordingRow {
    id: String,
    challenge_id: String,
    transmission_id: String,
    listener_id: String,
    frequency_hz: i64,
    sample_rate: i64,
    expected_duration_s: f64,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    success: Option<bool>,
    image_path: Option<String>,
    image_width: Option<i64>,
    image_height: Option<i64>,
    error_message: Option<String>,
}

impl From<RecordingRow> for Recording {
    fn from(row: RecordingRow) -> Self {
        Recording {
            id: row.id,
            challenge_id: row.challenge_id,
            transmission_id: row.transmission_id,
            listener_id: row.listener_id,
            frequency_hz: row.frequency_hz as u64,
            sample_rate: row.sample_rate as u32,
            expected_duration_s: row.expected_duration_s,
            started_at: row.started_at,
            completed_at: row.completed_at,
            success: row.success,
            image_path: row.image_path,
            image_width: row.image_width.map(|w| w as u32),
            image_height: row.image_height.map(|h| h as u32),
            error_message: row.error_message,
        }
    }
}

impl Store {
    /// Append-only: created when the `AssignmentCoordinator` pushes a
    /// `recording_assignment` to a listener and the listener acknowledges
    /// with `recording/start`.
    pub async fn create_recording(&self, rec: &Recording) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO recordings
            (id, challenge_id, transmission_id, listener_id, frequency_hz, sample_rate,
                expected_duration_s, started_at, completed_at, success, image_path,
                image_width, image_height, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, NULL, NULL, NULL, NULL)",
        )
        .bind(&rec.id)
        .bind(&rec.challenge_id)
        .bind(&rec.transmission_id)
        .bind(&rec.listener_id)
        .bind(rec.frequency_hz as i64)
        .bind(rec.sample_rate as i64)
        .bind(rec.expected_duration_s)
        .bind(rec.started_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn complete_recording(
        &self,
        id: &str,
        success: bool,
        image_path: Option<&str>,
        image_width: Option<u32>,
        image_height: Option<u32>,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE recordings
            SET completed_at = ?, success = ?, image_path = ?, image_width = ?,
            image_height = ?, error_message = ?
            WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(success)
        .bind(image_path)
        .bind(image_width.map(|w| w as i64))
        .bind(image_height.map(|h| h as i64))
        .bind(error_message)
        .bind(id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("recording"));
        }
        Ok(())
    }

    pub async fn get_recording(&self, id: &str) -> Result<Option<Recording>, StoreError> {
        let row: Option<RecordingRow> = sqlx::query_as("SELECT * FROM recordings WHERE id = ?")
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Recording::from))
    }

    pub async fn list_recordings_for_transmission(
        &self,
        transmission_id: &str,
    ) -> Result<Vec<Recording>, StoreError> {
        let rows: Vec<RecordingRow> = sqlx::query_as(
            "SELECT * FROM recordings WHERE transmission_id = ? ORDER BY started_at DESC",
        )
        .bind(transmission_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Recording::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;
    use uuid::Uuid;

    fn sample_recording() -> Recording {
        Recording {
            id: Uuid::new_v4().to_string(),
            challenge_id: "c-1".to_owned(),
            transmission_id: "tx-1".to_owned(),
            listener_id: "listener-1".to_owned(),
            frequency_hz: 7_050_000,
            sample_rate: 2_400_000,
            expected_duration_s: 12.5,
            started_at: Utc::now(),
            completed_at: None,
            success: None,
            image_path: None,
            image_width: None,
            image_height: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn create_then_complete_roundtrips() {
        let store = test_store().await;
        let rec = sample_recording();
        store.create_recording(&rec).await.unwrap();
        store
        .complete_recording(&rec.id, true, Some("img/a.png"), Some(800), Some(600), None)
        .await
        .unwrap();
        let fetched = store.get_recording(&rec.id).await.unwrap().unwrap();
        assert_eq!(fetched.success, Some(true));
        assert_eq!(fetched.image_width, Some(800));
    }
}
