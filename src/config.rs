//! Layered settings: defaults, config files, then environment variables

use crate::error::{Error, Result};
use crate::pipeline::auth::AuthConfig;
use crate::pipeline::forwarder::{MirrorConfig, MirrorTarget};
use crate::pipeline::headers::paths;
use crate::pipeline::truncate::TruncateConfig;
use crate::pipeline::types::*;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub use config::ConfigError;

const ENV_PREFIX: &str = "CARETIMES_PIPELINE";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub mirror: MirrorSettings,
    pub audit: AuditSettings,
    pub auth: AuthSettings,
    pub truncate: Option<TruncateConfig>,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub request_timeout_ms: u64,
    pub max_request_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database_name: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MirrorSettings {
    pub targets: Vec<String>,
    pub timeout_ms: u64,
    pub max_in_flight: usize,
}

/// Where audit rows are written
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditStorage {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditSettings {
    pub enabled: bool,
    pub storage: AuditStorage,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub enabled: bool,
    pub required_role: Option<String>,
    pub bypass_paths: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Settings {
    pub fn new() -> std::result::Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8000)?
            .set_default("application.environment", environment.clone())?
            .set_default("application.request_timeout_ms", DEFAULT_REQUEST_TIMEOUT_MS)?
            .set_default("application.max_request_size", DEFAULT_MAX_REQUEST_SIZE as u64)?
            .set_default("database.host", "localhost")?
            .set_default("database.port", 5432)?
            .set_default("database.username", "postgres")?
            .set_default("database.password", "password")?
            .set_default("database.database_name", "caretimes")?
            .set_default("database.max_connections", 10)?
            .set_default("mirror.targets", Vec::<String>::new())?
            .set_default("mirror.timeout_ms", DEFAULT_MIRROR_TIMEOUT_MS)?
            .set_default("mirror.max_in_flight", DEFAULT_MAX_IN_FLIGHT_MIRRORS as u64)?
            .set_default("audit.enabled", true)?
            .set_default("audit.storage", "postgres")?
            .set_default("auth.enabled", true)?
            .set_default("auth.required_role", "admin")?
            .set_default("auth.bypass_paths", vec![paths::IS_ALIVE.to_string()])?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("mirror.targets")
                    .with_list_parse_key("auth.bypass_paths"),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.database_name
        )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.application.request_timeout_ms)
    }

    pub fn max_request_size(&self) -> Result<RequestSizeLimit> {
        RequestSizeLimit::try_new(self.application.max_request_size)
            .map_err(|e| Error::invalid_setting("application.max_request_size", e))
    }

    /// Validated mirror configuration
    pub fn mirror_config(&self) -> Result<MirrorConfig> {
        let targets = self
            .mirror
            .targets
            .iter()
            .filter(|target| !target.trim().is_empty())
            .map(|target| {
                MirrorTarget::try_new(target.clone())
                    .map_err(|e| Error::invalid_setting("mirror.targets", e))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MirrorConfig {
            targets,
            timeout: MirrorTimeoutMillis::try_new(self.mirror.timeout_ms)
                .map_err(|e| Error::invalid_setting("mirror.timeout_ms", e))?,
            max_in_flight: MaxInFlightMirrors::try_new(self.mirror.max_in_flight)
                .map_err(|e| Error::invalid_setting("mirror.max_in_flight", e))?,
        })
    }

    /// Validated authentication configuration
    pub fn auth_config(&self) -> Result<AuthConfig> {
        let bypass_paths = self
            .auth
            .bypass_paths
            .iter()
            .map(|path| {
                BypassPath::try_new(path.trim().to_string())
                    .map_err(|e| Error::invalid_setting("auth.bypass_paths", e))
            })
            .collect::<Result<_>>()?;

        let required_role = self
            .auth
            .required_role
            .as_deref()
            .filter(|role| !role.trim().is_empty())
            .map(|role| {
                Role::try_new(role.to_string())
                    .map_err(|e| Error::invalid_setting("auth.required_role", e))
            })
            .transpose()?;

        Ok(AuthConfig {
            bypass_paths,
            required_role,
        })
    }
}
