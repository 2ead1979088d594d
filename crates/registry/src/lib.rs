//! The controller's AgentRegistry: runner/listener enrollment,
//! heartbeat tracking, and the multi-factor host-binding check that guards
//! every subsequent request from an enrolled agent.

pub mod error;

use std::sync::Arc;

use chrono::{Duration, Utc};
use rfctl_model::{Agent, AgentStatus, AgentType, Device};
use rfctl_store::Store;
use tracing::warn;

pub use error::RegistryError;

/// Heartbeat freshness window inside which the host-binding check applies
/// ("its last heartbeat is within 2 minutes").
const HEARTBEAT_FRESHNESS: Duration = Duration::minutes(2);

#[derive(Clone)]
pub struct AgentRegistry {
    store: Arc<Store>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Upserts the agent row and, if `api_key` is supplied (from
    /// enrollment), stores its hash. Always flips the row to `online`.
    pub async fn register(
        &self,
        agent_id: &str,
        agent_type: AgentType,
        hostname: &str,
        ip: &str,
        mac: Option<&str>,
        machine_id: Option<&str>,
        devices: &[Device],
        api_key: Option<&str>,
    ) -> Result<(), RegistryError> {
        let api_key_hash = api_key.map(rfctl_crypto::hash_api_key).transpose()?;
        self.store
        .upsert_agent(
            agent_id,
            agent_type,
            hostname,
            ip,
            mac,
            machine_id,
            devices,
            api_key_hash.as_deref(),
        )
        .await?;
        Ok(())
    }

    /// Returns the agent's previous status, so the caller can publish a
    /// "came back online" event when it had been `offline`.
    pub async fn heartbeat(&self, agent_id: &str) -> Result<Option<AgentStatus>, RegistryError> {
        Ok(self.store.heartbeat_agent(agent_id).await?)
    }

    pub async fn mark_offline(&self, agent_id: &str) -> Result<(), RegistryError> {
        Ok(self.store.mark_agent_offline(agent_id).await?)
    }

    pub async fn enable(&self, agent_id: &str) -> Result<(), RegistryError> {
        Ok(self.store.set_agent_enabled(agent_id, true).await?)
    }

    pub async fn disable(&self, agent_id: &str) -> Result<(), RegistryError> {
        Ok(self.store.set_agent_enabled(agent_id, false).await?)
    }

    /// multi-factor host binding. An API key matches exactly one
    /// agent (hashes are salted per-record, so this walks every enrolled
    /// agent rather than indexing on the plaintext key). If that agent is
    /// online with a fresh heartbeat, at least one of `{ip, hostname, mac,
    /// machine_id}` must also match the stored value; otherwise the agent
    /// is assumed to be migrating and the host check is skipped.
    pub async fn verify_request(
        &self,
        api_key: &str,
        current_ip: &str,
        current_hostname: &str,
        current_mac: Option<&str>,
        current_machine_id: Option<&str>,
    ) -> Result<Option<String>, RegistryError> {
        let candidates = self.store.agents_with_api_key_hash().await?;
        let matched = candidates.into_iter().find(|agent| {
                agent
                .api_key_hash
                .as_deref().is_some_and(|hash| rfctl_crypto::verify_api_key(api_key, hash))
        });

        let Some(agent) = matched else {
            warn!(event = "agent_auth_failure", ip = current_ip, "api key matched no agent");
            return Ok(None);
        };

        if !self.host_check_required(&agent) {
            return Ok(Some(agent.agent_id));
        }

        let host_matches = (current_mac.is_some() && current_mac == agent.mac.as_deref())
            || (current_machine_id.is_some() && current_machine_id == agent.machine_id.as_deref())
            || current_ip == agent.ip
            || current_hostname == agent.hostname;

        if host_matches {
            Ok(Some(agent.agent_id))
        } else {
            warn!(
                event = "agent_host_binding_mismatch",
                agent_id = %agent.agent_id,
                ip = current_ip,
                hostname = current_hostname,
                "host binding check failed for online agent"
            );
            Ok(None)
        }
    }

    fn host_check_required(&self, agent: &Agent) -> bool {
        agent.status == AgentStatus::Online
        && agent
        .last_heartbeat
        .is_some_and(|hb| Utc::now() - hb < HEARTBEAT_FRESHNESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> AgentRegistry {
        AgentRegistry::new(Arc::new(rfctl_store::test_store().await))
    }

    #[tokio::test]
    async fn verify_request_accepts_offline_agent_regardless_of_host() {
        let reg = registry().await;
        reg.register(
            "runner-1",
            AgentType::Runner,
            "host-a",
            "10.0.0.1",
            None,
            None,
            &[],
            Some("secret-key"),
        )
        .await
        .unwrap();
        reg.mark_offline("runner-1").await.unwrap();

        let agent_id = reg
        .verify_request("secret-key", "10.0.0.99", "different-host", None, None)
        .await
        .unwrap();
        assert_eq!(agent_id.as_deref(), Some("runner-1"));
    }

    #[tokio::test]
    async fn verify_request_rejects_online_agent_with_no_host_match() {
        let reg = registry().await;
        reg.register(
            "runner-1",
            AgentType::Runner,
            "host-a",
            "10.0.0.1",
            None,
            None,
            &[],
            Some("secret-key"),
        )
        .await
        .unwrap();

        let agent_id = reg
        .verify_request("secret-key", "10.0.0.99", "different-host", None, None)
        .await
        .unwrap();
        assert!(agent_id.is_none());
    }

    #[tokio::test]
    async fn verify_request_accepts_online_agent_with_ip_match() {
        let reg = registry().await;
        reg.register(
            "runner-1",
            AgentType::Runner,
            "host-a",
            "10.0.0.1",
            None,
            None,
            &[],
            Some("secret-key"),
        )
        .await
        .unwrap();

        let agent_id = reg
        .verify_request("secret-key", "10.0.0.1", "different-host", None, None)
        .await
        .unwrap();
        assert_eq!(agent_id.as_deref(), Some("runner-1"));
    }

    #[tokio::test]
    async fn verify_request_rejects_unknown_key() {
        let reg = registry().await;
        let agent_id = reg
        .verify_request("nonexistent-key", "10.0.0.1", "host-a", None, None)
        .await
        .unwrap();
        assert!(agent_id.is_none());
    }
}
