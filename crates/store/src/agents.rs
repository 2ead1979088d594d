use chrono::{DateTime, Utc};
use rfctl_model::{Agent, AgentStatus, AgentType, Device};
use sqlx::FromRow;

use crate::{Store, StoreError};

#[derive(FromRow)]
struct AgentRow {
    agent_id: String,
    agent_type: String,
    hostname: String,
    ip: String,
    mac: Option<String>,
    machine_id: Option<String>,
    devices: String,
    api_key_hash: Option<String>,
    status: String,
    enabled: bool,
    last_heartbeat: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = StoreError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let agent_type = match row.agent_type.as_str() {
            "runner" => AgentType::Runner,
            _ => AgentType::Listener,
        };
        let status = match row.status.as_str() {
            "online" => AgentStatus::Online,
            _ => AgentStatus::Offline,
        };
        let devices: Vec<Device> = serde_json::from_str(&row.devices)?;
        Ok(Agent {
                agent_id: row.agent_id,
                agent_type,
                hostname: row.hostname,
                ip: row.ip,
                mac: row.mac,
                machine_id: row.machine_id,
                devices,
                api_key_hash: row.api_key_hash,
                status,
                enabled: row.enabled,
                last_heartbeat: row.last_heartbeat,
                created_at: row.created_at,
        })
    }
}

fn agent_type_str(t: AgentType) -> &'static str {
    match t {
        AgentType::Runner => "runner",
        AgentType::Listener => "listener",
    }
}

impl Store {
    /// Upsert an agent row (`register`). Sets `status=online,
    /// last_heartbeat=now`; if `api_key_hash` is `Some`, it replaces any
    /// previously stored hash (a fresh enrollment re-binding credentials).
    pub async fn upsert_agent(
        &self,
        agent_id: &str,
        agent_type: AgentType,
        hostname: &str,
        ip: &str,
        mac: Option<&str>,
        machine_id: Option<&str>,
        devices: &[Device],
        api_key_hash: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let devices_json = serde_json::to_string(devices)?;

        let existing: Option<(Option<String>,)> =
        sqlx::query_as("SELECT api_key_hash FROM agents WHERE agent_id = ?")
        .bind(agent_id)
        .fetch_optional(self.pool())
        .await?;

        let effective_hash = match (api_key_hash, existing.as_ref().and_then(|e| e.0.as_deref())) {
            (Some(new_hash), _) => Some(new_hash.to_owned()),
            (None, Some(old_hash)) => Some(old_hash.to_owned()),
            (None, None) => None,
        };

        sqlx::query(
            "INSERT INTO agents
            (agent_id, agent_type, hostname, ip, mac, machine_id, devices, api_key_hash,
                status, enabled, last_heartbeat, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'online', 1, ?, ?)
            ON CONFLICT(agent_id) DO UPDATE SET
            hostname = excluded.hostname,
            ip = excluded.ip,
            mac = excluded.mac,
            machine_id = excluded.machine_id,
            devices = excluded.devices,
            api_key_hash = excluded.api_key_hash,
            status = 'online',
            last_heartbeat = excluded.last_heartbeat",
        )
        .bind(agent_id)
        .bind(agent_type_str(agent_type))
        .bind(hostname)
        .bind(ip)
        .bind(mac)
        .bind(machine_id)
        .bind(devices_json)
        .bind(&effective_hash)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// `heartbeat`: bump `last_heartbeat`/`status=online`, returning
    /// the previous status so the caller can publish a "came back online"
    /// event on an offline→online transition.
    pub async fn heartbeat_agent(&self, agent_id: &str) -> Result<Option<AgentStatus>, StoreError> {
        let previous: Option<(String,)> =
        sqlx::query_as("SELECT status FROM agents WHERE agent_id = ?")
        .bind(agent_id)
        .fetch_optional(self.pool())
        .await?;
        let Some((previous_status,)) = previous else {
            return Ok(None);
        };

        sqlx::query("UPDATE agents SET status = 'online', last_heartbeat = ? WHERE agent_id = ?")
        .bind(Utc::now())
        .bind(agent_id)
        .execute(self.pool())
        .await?;

        Ok(Some(if previous_status == "online" {
                    AgentStatus::Online
                } else {
                    AgentStatus::Offline
        }))
    }

    pub async fn mark_agent_offline(&self, agent_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE agents SET status = 'offline' WHERE agent_id = ?")
        .bind(agent_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_agent_enabled(&self, agent_id: &str, enabled: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE agents SET enabled = ? WHERE agent_id = ?")
        .bind(enabled)
        .bind(agent_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("agent"));
        }
        Ok(())
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE agent_id = ?")
        .bind(agent_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(Agent::try_from).transpose()
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        let rows: Vec<AgentRow> = sqlx::query_as("SELECT * FROM agents ORDER BY agent_id")
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    pub async fn list_agents_by_type(&self, agent_type: AgentType) -> Result<Vec<Agent>, StoreError> {
        let rows: Vec<AgentRow> =
        sqlx::query_as("SELECT * FROM agents WHERE agent_type = ? ORDER BY agent_id")
        .bind(agent_type_str(agent_type))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    /// `verify_request`: find the one agent whose stored API-key hash
    /// matches, without doing the bcrypt comparison itself (the caller,
    /// `rfctl-auth`, owns hashing) — returns every agent with a hash so the
    /// caller can run the constant-time check per candidate.
    pub async fn agents_with_api_key_hash(&self) -> Result<Vec<Agent>, StoreError> {
        let rows: Vec<AgentRow> =
        sqlx::query_as("SELECT * FROM agents WHERE api_key_hash IS NOT NULL")
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    /// `reap_stale_agents`: any `online` agent whose heartbeat is
    /// older than `timeout_secs` flips to `offline`. Returns the ids that
    /// went offline.
    pub async fn reap_stale_agents(&self) -> Result<Vec<String>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.agent_timeout_secs);
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT agent_id FROM agents
            WHERE status = 'online' AND (last_heartbeat IS NULL OR last_heartbeat < ?)",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;
        let ids: Vec<String> = rows.into_iter().map(|(id,)| id).collect();

        if !ids.is_empty() {
            sqlx::query(
                "UPDATE agents SET status = 'offline'
                WHERE status = 'online' AND (last_heartbeat IS NULL OR last_heartbeat < ?)",
            )
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;

    #[tokio::test]
    async fn upsert_then_fetch_roundtrips() {
        let store = test_store().await;
        store
        .upsert_agent(
            "runner-1",
            AgentType::Runner,
            "host1",
            "10.0.0.1",
            None,
            None,
            &[],
            Some("hashed"),
        )
        .await
        .unwrap();
        let agent = store.get_agent("runner-1").await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Online);
        assert_eq!(agent.api_key_hash.as_deref(), Some("hashed"));
    }

    #[tokio::test]
    async fn upsert_preserves_existing_hash_when_not_reenrolling() {
        let store = test_store().await;
        store
        .upsert_agent(
            "runner-2",
            AgentType::Runner,
            "host2",
            "10.0.0.2",
            None,
            None,
            &[],
            Some("original-hash"),
        )
        .await
        .unwrap();
        store
        .upsert_agent(
            "runner-2",
            AgentType::Runner,
            "host2-renamed",
            "10.0.0.2",
            None,
            None,
            &[],
            None,
        )
        .await
        .unwrap();
        let agent = store.get_agent("runner-2").await.unwrap().unwrap();
        assert_eq!(agent.api_key_hash.as_deref(), Some("original-hash"));
        assert_eq!(agent.hostname, "host2-renamed");
    }

    #[tokio::test]
    async fn heartbeat_reports_previous_status() {
        let store = test_store().await;
        store
        .upsert_agent("runner-3", AgentType::Runner, "h", "ip", None, None, &[], None)
        .await
        .unwrap();
        store.mark_agent_offline("runner-3").await.unwrap();
        let previous = store.heartbeat_agent("runner-3").await.unwrap().unwrap();
        assert_eq!(previous, AgentStatus::Offline);
        let agent = store.get_agent("runner-3").await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Online);
    }

    #[tokio::test]
    async fn reap_stale_agents_flips_to_offline() {
        let store = test_store().await;
        store
        .upsert_agent("runner-4", AgentType::Runner, "h", "ip", None, None, &[], None)
        .await
        .unwrap();
        sqlx::query("UPDATE agents SET last_heartbeat = ? WHERE agent_id = 'runner-4'")
        .bind(Utc::now() - chrono::Duration::seconds(200))
        .execute(store.pool())
        .await
        .unwrap();
        let gone = store.reap_stale_agents().await.unwrap();
        assert_eq!(gone, vec!["runner-4".to_owned()]);
        assert_eq!(
            store.get_agent("runner-4").await.unwrap().unwrap().status,
            AgentStatus::Offline
        );
    }
}
