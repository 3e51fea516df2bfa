use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process-wide configuration, built once at startup and passed by reference.
///
/// Business logic never reads environment variables directly; the only place
/// ambient state enters the system is [`crate::load_app_config`].
#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub app_name: String,
    pub app_version: String,
    pub airtable_api_key: String,
    pub airtable_base_id: String,
    pub airtable_timeout_secs: u64,
    pub session_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub upload_dir: PathBuf,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("app_name", &self.app_name)
            .field("app_version", &self.app_version)
            .field("airtable_api_key", &"[redacted]")
            .field("airtable_base_id", &self.airtable_base_id)
            .field("airtable_timeout_secs", &self.airtable_timeout_secs)
            .field("session_timeout_secs", &self.session_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("upload_dir", &self.upload_dir)
            .finish()
    }
}
