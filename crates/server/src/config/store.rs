use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfigToml {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Assignment timeout the Store enforces before the reaper re-queues an
    /// `assigned` row (,: "5 min").
    #[serde(default = "default_assignment_timeout_secs")]
    pub assignment_timeout_secs: i64,
    /// How long an agent may go without a heartbeat before the reaper marks
    /// it `offline` ("heartbeat gap >90s").
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: i64,
    /// Directory backing the content-addressed file store ("a file
    /// directory whose names are sha256 hashes").
    #[serde(default = "default_file_dir")]
    pub file_dir: String,
    /// Path to the AES master key file, created with `0600`
    /// permissions if absent.
    #[serde(default = "default_master_key_path")]
    pub master_key_path: String,
}

impl Default for StoreConfigToml {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_pool_size(),
            assignment_timeout_secs: default_assignment_timeout_secs(),
            agent_timeout_secs: default_agent_timeout_secs(),
            file_dir: default_file_dir(),
            master_key_path: default_master_key_path(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://rfctl.db?mode=rwc".to_owned()
}

fn default_pool_size() -> u32 {
    5
}

fn default_assignment_timeout_secs() -> i64 {
    300
}

fn default_agent_timeout_secs() -> i64 {
    90
}

impl StoreConfigToml {
    #[must_use]
    pub fn to_store_config(&self) -> rfctl_store::StoreConfig {
        rfctl_store::StoreConfig {
            database_url: self.database_url.clone(),
            pool_size: self.pool_size,
            assignment_timeout_secs: self.assignment_timeout_secs,
            agent_timeout_secs: self.agent_timeout_secs,
        }
    }
}

fn default_file_dir() -> String {
    "files".to_owned()
}

fn default_master_key_path() -> String {
    "master.key".to_owned()
}
