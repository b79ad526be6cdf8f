use salesdesk_shared::Masked;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub erp: ErpConfig,
    pub local_api: LocalApiConfig,
    pub composer: ComposerConfig,
    #[serde(default)]
    pub commit: CommitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Sessions untouched this long are discarded.
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: u64,
}

/// External order service.
#[derive(Debug, Deserialize, Clone)]
pub struct ErpConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub api_key: Masked<String>,
}

/// The application's own REST API.
#[derive(Debug, Deserialize, Clone)]
pub struct LocalApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub token: Masked<String>,
}

/// Identity stamped on every order this instance composes.
#[derive(Debug, Deserialize, Clone)]
pub struct ComposerConfig {
    pub employee_id: Masked<String>,
    pub company_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommitConfig {
    #[serde(default = "default_status_marker")]
    pub status_marker: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            status_marker: default_status_marker(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_session_idle_minutes() -> u64 {
    120
}

fn default_status_marker() -> String {
    "submitted".to_string()
}

impl ServerConfig {
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_minutes * 60)
    }
}

impl ErpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl LocalApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. SALESDESK_ERP__BASE_URL
            .add_source(config::Environment::with_prefix("SALESDESK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
