//! The controller's EnrollmentService: one-shot enrollment
//! tokens that convert into runner API keys, and long-lived provisioning
//! keys that can mint those tokens without any other access to controller
//! state.

pub mod config_yaml;
pub mod error;

use std::sync::Arc;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use rfctl_model::{AgentType, Device, EnrollmentToken, ProvisioningKey};
use rfctl_registry::AgentRegistry;
use rfctl_store::Store;
use tracing::info;

pub use config_yaml::ProvisionDevice;
pub use error::EnrollmentError;

static KEY_ID_FORMAT: LazyLock<regex::Regex> =
LazyLock::new(|| regex::Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid regex"));

const DEFAULT_ENROLLMENT_EXPIRY_HOURS: i64 = 24;

#[derive(Clone)]
pub struct EnrollmentService {
    store: Arc<Store>,
    registry: AgentRegistry,
}

/// Input to [`EnrollmentService::enroll`], borrowed for the duration of the
/// call: the runner presents these fields once, over the token-authenticated
/// `enroll` endpoint.
pub struct EnrollRequest<'a> {
    pub enrollment_token: &'a str,
    pub api_key: &'a str,
    pub runner_id: &'a str,
    pub hostname: &'a str,
    pub ip: &'a str,
    pub mac: Option<&'a str>,
    pub machine_id: Option<&'a str>,
    pub devices: &'a [Device],
}

/// Outcome of a successful enrollment, enough for the HTTP layer to publish
/// the `runner_enrolled` event and acknowledge the runner.
#[derive(Debug, Clone)]
pub struct EnrolledRunner {
    pub runner_id: String,
    pub runner_name: String,
}

/// A freshly minted re-enrollment token plus an advisory API key. The key
/// is only a suggestion for the runner's new config: nothing binds it to
/// the agent row until `enroll` is called and the token is consumed, at
/// which point whatever key is presented there becomes authoritative.
#[derive(Debug, Clone)]
pub struct ReEnrollment {
    pub token: EnrollmentToken,
    pub suggested_api_key: String,
}

/// Result of `provision`: fresh credentials plus a ready-to-paste runner
/// config document.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub runner_name: String,
    pub runner_id: String,
    pub enrollment_token: String,
    pub api_key: String,
    pub expires_utc: DateTime<Utc>,
    pub config_yaml: String,
}

/// Input to `provision`.
#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
    pub runner_name: String,
    pub runner_id: Option<String>,
    pub expires_hours: Option<i64>,
    pub server_url: String,
    pub verify_ssl: bool,
    pub devices: Vec<ProvisionDevice>,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(store: Arc<Store>, registry: AgentRegistry) -> Self {
        Self { store, registry }
    }

    /// Admin-issued enrollment token for a brand new runner ("created
    /// by admins with `create_users`; one-shot; default 24h expiry").
    /// Permission enforcement is the caller's responsibility (`rfctl-auth`).
    pub async fn create_enrollment_token(
        &self,
        runner_name: &str,
        created_by: &str,
        expires_hours: Option<i64>,
    ) -> Result<EnrollmentToken, EnrollmentError> {
        let token = EnrollmentToken {
            token: rfctl_crypto::generate_enrollment_token(),
            runner_name: runner_name.to_owned(),
            created_by: created_by.to_owned(),
            expires_utc: Utc::now() + Duration::hours(expires_hours.unwrap_or(DEFAULT_ENROLLMENT_EXPIRY_HOURS)),
            used: false,
            used_at: None,
            used_by_runner_id: None,
            re_enrollment_for: None,
        };
        self.store.create_enrollment_token(&token).await?;
        Ok(token)
    }

    pub async fn list_enrollment_tokens(&self) -> Result<Vec<EnrollmentToken>, EnrollmentError> {
        Ok(self.store.list_enrollment_tokens().await?)
    }

    pub async fn delete_enrollment_token(&self, token: &str) -> Result<(), EnrollmentError> {
        self.store.delete_enrollment_token(token).await?;
        Ok(())
    }

    /// Issues a fresh enrollment token bound to an already-enrolled
    /// `runner_id`, so its credentials can be rebound to a replacement host
    /// (see entity lifecycles).
    pub async fn re_enroll(
        &self,
        runner_id: &str,
        created_by: &str,
        expires_hours: Option<i64>,
    ) -> Result<ReEnrollment, EnrollmentError> {
        self.store
        .get_agent(runner_id)
        .await?
        .ok_or(EnrollmentError::RunnerNotFound)?;

        let token = EnrollmentToken {
            token: rfctl_crypto::generate_enrollment_token(),
            runner_name: runner_id.to_owned(),
            created_by: created_by.to_owned(),
            expires_utc: Utc::now() + Duration::hours(expires_hours.unwrap_or(DEFAULT_ENROLLMENT_EXPIRY_HOURS)),
            used: false,
            used_at: None,
            used_by_runner_id: None,
            re_enrollment_for: Some(runner_id.to_owned()),
        };
        self.store.create_enrollment_token(&token).await?;
        info!(runner_id, "re-enrollment token generated");
        Ok(ReEnrollment {
                token,
                suggested_api_key: rfctl_crypto::generate_api_key(),
        })
    }

    /// Converts a live enrollment token into an enrolled runner.
    ///
    /// Validation order: token liveness, the "already enrolled" conflict
    /// check, the re-enrollment host-id match, then the upsert, then the
    /// one-shot token consumption.
    pub async fn enroll(&self, req: EnrollRequest<'_>) -> Result<EnrolledRunner, EnrollmentError> {
        let token = self
        .store
        .get_enrollment_token(req.enrollment_token)
        .await?
        .filter(|t| t.is_live(Utc::now()))
        .ok_or(EnrollmentError::InvalidOrExpiredToken)?;

        let existing = self.store.get_agent(req.runner_id).await?;
        let is_re_enrollment = token.re_enrollment_for.is_some();

        if existing.as_ref().is_some_and(|a| a.api_key_hash.is_some()) && !is_re_enrollment {
            return Err(EnrollmentError::RunnerAlreadyEnrolled);
        }
        if let Some(bound_to) = &token.re_enrollment_for {
            if bound_to != req.runner_id {
                return Err(EnrollmentError::ReEnrollmentMismatch);
            }
        }

        self.registry
        .register(
            req.runner_id,
            AgentType::Runner,
            req.hostname,
            req.ip,
            req.mac,
            req.machine_id,
            req.devices,
            Some(req.api_key),
        )
        .await?;

        if !self
        .store
        .consume_enrollment_token(req.enrollment_token, req.runner_id)
        .await?
        {
            return Err(EnrollmentError::InvalidOrExpiredToken);
        }

        info!(runner_id = req.runner_id, runner_name = %token.runner_name, "runner enrolled");
        Ok(EnrolledRunner {
                runner_id: req.runner_id.to_owned(),
                runner_name: token.runner_name,
        })
    }

    /// Creates a long-lived provisioning key. Permission enforcement
    /// (`create_provisioning_key`) is the caller's responsibility.
    pub async fn create_provisioning_key(
        &self,
        key_id: &str,
        description: &str,
        created_by: &str,
    ) -> Result<(ProvisioningKey, String), EnrollmentError> {
        if key_id.is_empty() || !KEY_ID_FORMAT.is_match(key_id) {
            return Err(EnrollmentError::InvalidKeyIdFormat);
        }
        let existing = self.store.list_provisioning_keys().await?;
        if existing.iter().any(|k| k.key_id == key_id) {
            return Err(EnrollmentError::KeyIdConflict);
        }

        let api_key = rfctl_crypto::generate_api_key();
        let key = ProvisioningKey {
            key_id: key_id.to_owned(),
            api_key_hash: rfctl_crypto::hash_api_key(&api_key)?,
            description: description.to_owned(),
            created_by: created_by.to_owned(),
            enabled: true,
            created_at: Utc::now(),
        };
        self.store.create_provisioning_key(&key).await?;
        info!(key_id, "provisioning key created");
        Ok((key, api_key))
    }

    pub async fn list_provisioning_keys(&self) -> Result<Vec<ProvisioningKey>, EnrollmentError> {
        Ok(self.store.list_provisioning_keys().await?)
    }

    pub async fn set_provisioning_key_enabled(
        &self,
        key_id: &str,
        enabled: bool,
    ) -> Result<(), EnrollmentError> {
        self.store.set_provisioning_key_enabled(key_id, enabled).await?;
        Ok(())
    }

    pub async fn delete_provisioning_key(&self, key_id: &str) -> Result<(), EnrollmentError> {
        self.store.delete_provisioning_key(key_id).await?;
        Ok(())
    }

    /// Mints fresh enrollment credentials for a brand new runner, bearer-
    /// authenticated by a provisioning key ("stateless; no CSRF").
    /// Returns the credentials plus a ready-to-paste runner config.
    pub async fn provision(
        &self,
        presented_key: &str,
        req: ProvisionRequest,
    ) -> Result<Provisioned, EnrollmentError> {
        if req.runner_name.is_empty() {
            return Err(EnrollmentError::MissingField("runner_name"));
        }
        let key = self.authenticate_provisioning_key(presented_key).await?;
        let runner_id = req.runner_id.clone().unwrap_or_else(|| req.runner_name.clone());
        let created_by = format!("provisioning:{}", key.key_id);

        let api_key = rfctl_crypto::generate_api_key();
        let enrollment_token = rfctl_crypto::generate_enrollment_token();
        let expires_utc = Utc::now() + Duration::hours(req.expires_hours.unwrap_or(DEFAULT_ENROLLMENT_EXPIRY_HOURS));

        let token = EnrollmentToken {
            token: enrollment_token.clone(),
            runner_name: req.runner_name.clone(),
            created_by,
            expires_utc,
            used: false,
            used_at: None,
            used_by_runner_id: None,
            re_enrollment_for: None,
        };
        self.store.create_enrollment_token(&token).await?;

        let config_yaml = config_yaml::render(
            &req.runner_name,
            &runner_id,
            &key.key_id,
            &req.server_url,
            &enrollment_token,
            &api_key,
            req.verify_ssl,
            &req.devices,
            Utc::now(),
        );

        info!(runner_name = %req.runner_name, key_id = %key.key_id, "runner provisioned");
        Ok(Provisioned {
                runner_name: req.runner_name,
                runner_id,
                enrollment_token,
                api_key,
                expires_utc,
                config_yaml,
        })
    }

    async fn authenticate_provisioning_key(
        &self,
        presented: &str,
    ) -> Result<ProvisioningKey, EnrollmentError> {
        let keys = self.store.enabled_provisioning_keys().await?;
        keys.into_iter().find(|k| rfctl_crypto::verify_api_key(presented, &k.api_key_hash))
        .ok_or(EnrollmentError::InvalidProvisioningKey)
    }

    pub async fn cleanup_expired_tokens(&self) -> Result<u64, EnrollmentError> {
        Ok(self.store.cleanup_expired_tokens().await?)
    }
}
