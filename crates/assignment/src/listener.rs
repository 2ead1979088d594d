use rfctl_model::{Agent, AgentStatus, AgentType, Device};

/// Picks the first enabled, online listener whose `frequency_limits` cover
/// `freq_hz`. Listener assignment is opportunistic, not mandatory:
/// a challenge transmits whether or not a covering listener is found.
#[must_use]
pub fn select_listener(agents: &[Agent], freq_hz: u64) -> Option<(&Agent, &Device)> {
    agents
    .iter().filter(|a| a.agent_type == AgentType::Listener && a.enabled && a.status == AgentStatus::Online)
    .find_map(|a| a.device_covering(freq_hz).map(|d| (a, d)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rfctl_model::FrequencyLimit;

    fn listener(id: &str, enabled: bool, status: AgentStatus, limits: Vec<FrequencyLimit>) -> Agent {
        Agent {
            agent_id: id.to_owned(),
            agent_type: AgentType::Listener,
            hostname: "host".to_owned(),
            ip: "10.0.0.1".to_owned(),
            mac: None,
            machine_id: None,
            devices: vec![Device {
                    device_id: "dev-1".to_owned(),
                    model: "rtlsdr".to_owned(),
                    name_or_serial: "sn-1".to_owned(),
                    frequency_limits: limits,
                    antenna: None,
                    bias_t: None,
            }],
            api_key_hash: None,
            status,
            enabled,
            last_heartbeat: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn selects_covering_online_listener() {
        let agents = vec![listener(
                "l1",
                true,
                AgentStatus::Online,
                vec![FrequencyLimit { min_hz: 100, max_hz: 200 }],
        )];
        let (agent, _) = select_listener(&agents, 150).unwrap();
        assert_eq!(agent.agent_id, "l1");
    }

    #[test]
    fn skips_offline_and_disabled_listeners() {
        let agents = vec![
            listener("l1", true, AgentStatus::Offline, vec![FrequencyLimit { min_hz: 100, max_hz: 200 }]),
            listener("l2", false, AgentStatus::Online, vec![FrequencyLimit { min_hz: 100, max_hz: 200 }]),
        ];
        assert!(select_listener(&agents, 150).is_none());
    }

    #[test]
    fn skips_listener_without_coverage() {
        let agents = vec![listener(
                "l1",
                true,
                AgentStatus::Online,
                vec![FrequencyLimit { min_hz: 100, max_hz: 200 }],
        )];
        assert!(select_listener(&agents, 999).is_none());
    }
}
