//! In-memory security-event ring, independent of the EventBus's log ring:
//! backs `GET /admin/security-log` with a queryable trail of auth-relevant
//! events, so "all security-relevant failures are logged with structured
//! context" is checkable without grepping stdout.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

const SECURITY_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecuritySeverity {
    Info,
    Warning,
    Error,
}

/// One entry in the ring. `context` carries event-specific extra fields
/// (e.g. `reason`, `permission`, `code`).
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub event_type: String,
    pub username: Option<String>,
    pub ip: String,
    pub user_agent: String,
    pub severity: SecuritySeverity,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: Vec<(String, String)>,
}

impl SecurityEvent {
    #[must_use]
    pub fn new(event_type: &str, ip: &str, user_agent: &str, severity: SecuritySeverity) -> Self {
        Self {
            event_type: event_type.to_owned(),
            username: None,
            ip: ip.to_owned(),
            user_agent: user_agent.to_owned(),
            severity,
            timestamp: Utc::now(),
            context: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.push((key.to_owned(), value.into()));
        self
    }
}

/// Bounded ring of the most recent security events, oldest first.
pub struct SecurityLog {
    events: RwLock<VecDeque<SecurityEvent>>,
}

impl Default for SecurityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(SECURITY_LOG_CAPACITY)),
        }
    }

    /// Records the event into the ring and mirrors it to `tracing` at the
    /// matching level (requires both: a live trail an operator can tail,
    /// and a queryable one a dashboard can page through).
    pub async fn record(&self, event: SecurityEvent) {
        match event.severity {
            SecuritySeverity::Error => tracing::error!(
                event_type = %event.event_type,
                username = ?event.username,
                ip = %event.ip,
                user_agent = %event.user_agent,
                "security event"
            ),
            SecuritySeverity::Warning => tracing::warn!(
                event_type = %event.event_type,
                username = ?event.username,
                ip = %event.ip,
                user_agent = %event.user_agent,
                "security event"
            ),
            SecuritySeverity::Info => tracing::info!(
                event_type = %event.event_type,
                username = ?event.username,
                ip = %event.ip,
                user_agent = %event.user_agent,
                "security event"
            ),
        }
        let mut events = self.events.write().await;
        if events.len() == SECURITY_LOG_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Snapshot of the most recent events, oldest first.
    pub async fn recent(&self) -> Vec<SecurityEvent> {
        self.events.read().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_returns_events_in_order() {
        let log = SecurityLog::new();
        log.record(SecurityEvent::new(
                "failed_login",
                "1.2.3.4",
                "curl/8.0",
                SecuritySeverity::Warning,
        ))
        .await;
        log.record(SecurityEvent::new(
                "successful_login",
                "1.2.3.4",
                "curl/8.0",
                SecuritySeverity::Info,
        ))
        .await;
        let recent = log.recent().await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, "failed_login");
        assert_eq!(recent[1].event_type, "successful_login");
    }

    #[tokio::test]
    async fn ring_caps_at_capacity() {
        let log = SecurityLog::new();
        for i in 0..(SECURITY_LOG_CAPACITY + 5) {
            log.record(SecurityEvent::new(
                    &i.to_string(),
                    "1.2.3.4",
                    "ua",
                    SecuritySeverity::Info,
            ))
            .await;
        }
        let recent = log.recent().await;
        assert_eq!(recent.len(), SECURITY_LOG_CAPACITY);
        assert_eq!(recent[0].event_type, "5");
    }
}
