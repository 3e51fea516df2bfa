use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    // Both credentials are required: the upstream base holds real customer
    // records, so there is deliberately no built-in fallback value.
    let airtable_api_key = require("AIRTABLE_API_KEY")?;
    let airtable_base_id = require("AIRTABLE_BASE_ID")?;

    let env = parse_environment(&or_default("LEADLENS_ENV", "development"))?;

    let bind_addr = parse_addr("LEADLENS_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("LEADLENS_LOG_LEVEL", "info");
    let app_name = or_default("LEADLENS_APP_NAME", "Estrattore UTM Term");
    let app_version = or_default("LEADLENS_APP_VERSION", "1.0.0");

    let airtable_timeout_secs = parse_u64("AIRTABLE_TIMEOUT_SECS", "30")?;
    let session_timeout_secs = parse_u64("LEADLENS_SESSION_TIMEOUT_SECS", "3600")?;
    let max_upload_bytes = parse_usize("LEADLENS_MAX_UPLOAD_BYTES", "16777216")?;
    let upload_dir = PathBuf::from(or_default("LEADLENS_UPLOAD_DIR", "./uploads"));

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        app_name,
        app_version,
        airtable_api_key,
        airtable_base_id,
        airtable_timeout_secs,
        session_timeout_secs,
        max_upload_bytes,
        upload_dir,
    })
}

fn parse_environment(raw: &str) -> Result<Environment, ConfigError> {
    match raw {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "LEADLENS_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}
