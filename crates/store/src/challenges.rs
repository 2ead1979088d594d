use chrono::{DateTime, Utc};
use rfctl_model::{Challenge, ChallengeConfig, ChallengeStatus};
use sqlx::FromRow;

use crate::{ChallengeTiming, Store, StoreError};

#[derive(FromRow)]
struct ChallengeRow {
    challenge_id: String,
    name: String,
    config: String,
    enabled: bool,
    status: String,
    priority: i64,
    assigned_to: Option<String>,
    assigned_at: Option<DateTime<Utc>>,
    assignment_expires: Option<DateTime<Utc>>,
    last_tx_time: Option<DateTime<Utc>>,
    transmission_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChallengeRow> for Challenge {
    type Error = StoreError;

    fn try_from(row: ChallengeRow) -> Result<Self, Self::Error> {
        let config: ChallengeConfig = serde_json::from_str(&row.config)?;
        let status = match row.status.as_str() {
            "assigned" => ChallengeStatus::Assigned,
            "waiting" => ChallengeStatus::Waiting,
            _ => ChallengeStatus::Queued,
        };
        Ok(Challenge {
                challenge_id: row.challenge_id,
                name: row.name,
                config,
                enabled: row.enabled,
                status,
                priority: row.priority,
                assigned_to: row.assigned_to,
                assigned_at: row.assigned_at,
                assignment_expires: row.assignment_expires,
                last_tx_time: row.last_tx_time,
                transmission_count: row.transmission_count as u64,
                created_at: row.created_at,
        })
    }
}

impl Store {
    pub async fn create_challenge(
        &self,
        challenge_id: &str,
        name: &str,
        config: &ChallengeConfig,
        priority: i64,
    ) -> Result<(), StoreError> {
        let config_json = serde_json::to_string(config)?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO challenges
            (challenge_id, name, config, enabled, status, priority,
                transmission_count, created_at)
            VALUES (?, ?, ?, 1, 'queued', ?, 0, ?)",
        )
        .bind(challenge_id)
        .bind(name)
        .bind(config_json)
        .bind(priority)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict("challenge"));
        }
        Ok(())
    }

    pub async fn get_challenge(&self, challenge_id: &str) -> Result<Option<Challenge>, StoreError> {
        let row: Option<ChallengeRow> =
        sqlx::query_as("SELECT * FROM challenges WHERE challenge_id = ?")
        .bind(challenge_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(Challenge::try_from).transpose()
    }

    pub async fn list_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        let rows: Vec<ChallengeRow> = sqlx::query_as(
            "SELECT * FROM challenges ORDER BY priority DESC, last_tx_time IS NOT NULL, last_tx_time, name",
        )
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Challenge::try_from).collect()
    }

    pub async fn update_challenge_config(
        &self,
        challenge_id: &str,
        config: &ChallengeConfig,
        priority: i64,
    ) -> Result<(), StoreError> {
        let config_json = serde_json::to_string(config)?;
        let result = sqlx::query(
            "UPDATE challenges SET config = ?, priority = ? WHERE challenge_id = ?",
        )
        .bind(config_json)
        .bind(priority)
        .bind(challenge_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("challenge"));
        }
        Ok(())
    }

    pub async fn set_challenge_enabled(
        &self,
        challenge_id: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE challenges SET enabled = ? WHERE challenge_id = ?")
        .bind(enabled)
        .bind(challenge_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("challenge"));
        }
        Ok(())
    }

    pub async fn delete_challenge(&self, challenge_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM challenges WHERE challenge_id = ?")
        .bind(challenge_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("challenge"));
        }
        let mut timing = self.timing.lock().await;
        timing.remove(challenge_id);
        Ok(())
    }

    /// Admin "trigger now": forces `next_tx = now` and status back
    /// to `queued`, bypassing the delay timer.
    pub async fn trigger_challenge_now(&self, challenge_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE challenges SET status = 'queued' WHERE challenge_id = ? AND status != 'assigned'",
        )
        .bind(challenge_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("challenge"));
        }
        let mut timing = self.timing.lock().await;
        timing.remove(challenge_id);
        Ok(())
    }

    /// `assign_next_challenge`: serializes with `BEGIN IMMEDIATE` so
    /// the readiness check (in-memory timing) and the status flip happen
    /// as one atomic step.
    pub async fn assign_next_challenge(&self, runner_id: &str) -> Result<Challenge, StoreError> {
        let mut timing = self.timing.lock().await;

        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let assign_result = self
        .assign_next_challenge_locked(&mut conn, runner_id, &mut timing)
        .await;

        match assign_result {
            Ok(challenge) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(challenge)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn assign_next_challenge_locked(
        &self,
        conn: &mut sqlx::pool::PoolConnection<sqlx::Sqlite>,
        runner_id: &str,
        timing: &mut std::collections::HashMap<String, ChallengeTiming>,
    ) -> Result<Challenge, StoreError> {
        let runner_enabled: Option<(bool,)> =
        sqlx::query_as("SELECT enabled FROM agents WHERE agent_id = ?")
        .bind(runner_id)
        .fetch_optional(&mut *conn)
        .await?;
        match runner_enabled {
            Some((true,)) => {}
            _ => return Err(StoreError::NoneAvailable),
        }

        let rows: Vec<ChallengeRow> = sqlx::query_as(
            "SELECT * FROM challenges
            WHERE enabled = 1 AND status IN ('queued', 'waiting')
            ORDER BY priority DESC, last_tx_time IS NOT NULL, last_tx_time, name",
        )
        .fetch_all(&mut *conn)
        .await?;

        let now = Utc::now();
        let mut chosen: Option<ChallengeRow> = None;
        for row in rows {
            let ready = timing
            .get(&row.challenge_id)
            .map_or(true, |t| t.next_tx <= now);
            if ready {
                if row.status == "waiting" {
                    sqlx::query("UPDATE challenges SET status = 'queued' WHERE challenge_id = ?")
                    .bind(&row.challenge_id)
                    .execute(&mut *conn)
                    .await?;
                }
                chosen = Some(row);
                break;
            }
        }

        let Some(row) = chosen else {
            return Err(StoreError::NoneAvailable);
        };

        let expires = now + chrono::Duration::seconds(self.config.assignment_timeout_secs);
        sqlx::query(
            "UPDATE challenges
            SET status = 'assigned', assigned_to = ?, assigned_at = ?, assignment_expires = ?
            WHERE challenge_id = ?",
        )
        .bind(runner_id)
        .bind(now)
        .bind(expires)
        .bind(&row.challenge_id)
        .execute(&mut *conn)
        .await?;

        let mut assigned_row = row;
        assigned_row.status = "assigned".to_owned();
        assigned_row.assigned_to = Some(runner_id.to_owned());
        assigned_row.assigned_at = Some(now);
        assigned_row.assignment_expires = Some(expires);
        Challenge::try_from(assigned_row)
    }

    /// `complete_challenge`: transitions `assigned → waiting`, bumps
    /// `transmission_count`/`last_tx_time`, and sets `next_tx` to the
    /// midpoint of `[min_delay, max_delay]`.
    pub async fn complete_challenge(
        &self,
        challenge_id: &str,
        runner_id: &str,
        _success: bool,
        _error: Option<&str>,
    ) -> Result<Option<ChallengeConfig>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT config FROM challenges WHERE challenge_id = ? AND assigned_to = ?",
        )
        .bind(challenge_id)
        .bind(runner_id)
        .fetch_optional(self.pool())
        .await?;

        let Some((config_json,)) = row else {
            return Ok(None);
        };
        let config: ChallengeConfig = serde_json::from_str(&config_json)?;

        let now = Utc::now();
        let avg_delay_secs = (config.min_delay + config.max_delay) as i64 / 2;
        let next_tx = now + chrono::Duration::seconds(avg_delay_secs);

        {
            let mut timing = self.timing.lock().await;
            timing.insert(
                challenge_id.to_owned(),
                ChallengeTiming {
                    last_tx: now,
                    next_tx,
                },
            );
        }

        sqlx::query(
            "UPDATE challenges
            SET status = 'waiting', assigned_to = NULL, assigned_at = NULL,
            assignment_expires = NULL, transmission_count = transmission_count + 1,
            last_tx_time = ?
            WHERE challenge_id = ?",
        )
        .bind(now)
        .bind(challenge_id)
        .execute(self.pool())
        .await?;

        Ok(Some(config))
    }

    /// `reap_stale_assignments`: any `assigned` row past its
    /// `assignment_expires` returns to `waiting`.
    pub async fn reap_stale_assignments(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE challenges
            SET status = 'waiting', assigned_to = NULL, assigned_at = NULL, assignment_expires = NULL
            WHERE status = 'assigned' AND assignment_expires < ?",
        )
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;
    use rfctl_model::FrequencySpec;

    fn sample_config() -> ChallengeConfig {
        ChallengeConfig {
            modulation: "cw".to_owned(),
            frequency: FrequencySpec::Fixed { frequency: 7_050_000 },
            min_delay: 60,
            max_delay: 90,
            flag: Some("flag{test}".to_owned()),
            flag_file_hash: None,
            public_view: Default::default(),
            extra: serde_json::Map::new(),
        }
    }

    async fn store_with_enabled_runner() -> Store {
        let store = test_store().await;
        store
        .upsert_agent(
            "runner-1",
            rfctl_model::AgentType::Runner,
            "h",
            "ip",
            None,
            None,
            &[],
            None,
        )
        .await
        .unwrap();
        store
    }

    #[tokio::test]
    async fn assign_picks_highest_priority_queued_challenge() {
        let store = store_with_enabled_runner().await;
        store
        .create_challenge("c-low", "low", &sample_config(), 1)
        .await
        .unwrap();
        store
        .create_challenge("c-high", "high", &sample_config(), 10)
        .await
        .unwrap();

        let assigned = store.assign_next_challenge("runner-1").await.unwrap();
        assert_eq!(assigned.challenge_id, "c-high");
        assert_eq!(assigned.status, ChallengeStatus::Assigned);
        assert_eq!(assigned.assigned_to.as_deref(), Some("runner-1"));
    }

    #[tokio::test]
    async fn assign_fails_when_runner_disabled() {
        let store = store_with_enabled_runner().await;
        store.set_agent_enabled("runner-1", false).await.unwrap();
        store
        .create_challenge("c-1", "one", &sample_config(), 1)
        .await
        .unwrap();
        let err = store.assign_next_challenge("runner-1").await.unwrap_err();
        assert!(matches!(err, StoreError::NoneAvailable));
    }

    #[tokio::test]
    async fn assign_fails_when_nothing_ready() {
        let store = store_with_enabled_runner().await;
        let err = store.assign_next_challenge("runner-1").await.unwrap_err();
        assert!(matches!(err, StoreError::NoneAvailable));
    }

    #[tokio::test]
    async fn complete_then_reassign_respects_delay() {
        let store = store_with_enabled_runner().await;
        store
        .create_challenge("c-1", "one", &sample_config(), 1)
        .await
        .unwrap();
        store.assign_next_challenge("runner-1").await.unwrap();

        let config = store
        .complete_challenge("c-1", "runner-1", true, None)
        .await
        .unwrap();
        assert!(config.is_some());

        let challenge = store.get_challenge("c-1").await.unwrap().unwrap();
        assert_eq!(challenge.status, ChallengeStatus::Waiting);
        assert_eq!(challenge.transmission_count, 1);

        // Not yet due (min_delay=60s), so nothing else is available.
        let err = store.assign_next_challenge("runner-1").await.unwrap_err();
        assert!(matches!(err, StoreError::NoneAvailable));
    }

    #[tokio::test]
    async fn trigger_now_clears_pending_delay() {
        let store = store_with_enabled_runner().await;
        store
        .create_challenge("c-1", "one", &sample_config(), 1)
        .await
        .unwrap();
        store.assign_next_challenge("runner-1").await.unwrap();
        store.complete_challenge("c-1", "runner-1", true, None).await.unwrap();
        store.trigger_challenge_now("c-1").await.unwrap();
        let assigned = store.assign_next_challenge("runner-1").await.unwrap();
        assert_eq!(assigned.challenge_id, "c-1");
    }

    #[tokio::test]
    async fn reap_stale_assignments_returns_to_waiting() {
        let store = store_with_enabled_runner().await;
        store
        .create_challenge("c-1", "one", &sample_config(), 1)
        .await
        .unwrap();
        store.assign_next_challenge("runner-1").await.unwrap();
        sqlx::query("UPDATE challenges SET assignment_expires = ? WHERE challenge_id = 'c-1'")
        .bind(Utc::now() - chrono::Duration::seconds(1))
        .execute(store.pool())
        .await
        .unwrap();
        let reaped = store.reap_stale_assignments().await.unwrap();
        assert_eq!(reaped, 1);
        let challenge = store.get_challenge("c-1").await.unwrap().unwrap();
        assert_eq!(challenge.status, ChallengeStatus::Waiting);
        assert!(challenge.assigned_to.is_none());
    }
}
