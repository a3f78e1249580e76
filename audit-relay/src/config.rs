//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `AUDIT_RELAY_`, `__` separates nested keys)
//! 2. Current working directory: ./audit-relay.toml
//! 3. XDG config directory: ~/.config/audit-relay/config.toml
//! 4. System directory: /etc/audit-relay/config.toml
//! 5. Default values
//!
//! ```toml
//! [service]
//! name = "orders-api"
//! log_level = "info,audit_relay=debug"
//!
//! [[registrations]]
//! name = "db"
//! failure_policy = "exception"
//! backend = { type = "sql", connection_string = "postgres://audit@db/audit", table = "AuditLog" }
//!
//! [[registrations]]
//! name = "siem"
//! failure_policy = "console"
//! backend = { type = "remote_log", host = "siem.local", port = 6514, certificate = { path = "/etc/audit-relay/siem.pem", algorithm = "rsa_encrypt" } }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::CertificateConfig;
use crate::error::{Error, Result};
use crate::format::DEFAULT_CODE_PREFIX;
use crate::policy::FailurePolicy;
use crate::provider::{AuditTableConfig, DeliveryMode};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "AUDIT_RELAY_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Service configuration
    pub service: ServiceConfig,

    /// Destinations, in dispatch order
    #[serde(default)]
    pub registrations: Vec<RegistrationConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Diagnostic output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Diagnostic output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// One destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Name reported in failures
    pub name: String,

    /// `none`, `console` or `exception`
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Backend settings
    pub backend: BackendConfig,
}

/// Backend settings, selected by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Relational table
    Sql(AuditTableConfig),
    /// Remote log collector
    RemoteLog(RemoteLogConfig),
    /// Process-local map
    Memory,
}

impl BackendConfig {
    /// Short backend name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sql(_) => "sql",
            Self::RemoteLog(_) => "remote_log",
            Self::Memory => "memory",
        }
    }
}

/// Remote log collector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLogConfig {
    /// Collector host
    pub host: String,

    /// Collector TCP port
    pub port: u16,

    /// Bundle protecting records; plaintext when absent
    #[serde(default)]
    pub certificate: Option<CertificateConfig>,

    /// Detached (default) or awaited delivery
    #[serde(default)]
    pub delivery: DeliveryMode,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Prefix of the `code` token
    #[serde(default = "default_code_prefix")]
    pub code_prefix: String,
}

impl RemoteLogConfig {
    /// Plaintext collector at `host:port` with defaults
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            certificate: None,
            delivery: DeliveryMode::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            code_prefix: default_code_prefix(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_code_prefix() -> String {
    DEFAULT_CODE_PREFIX.to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "audit-relay".to_string(),
                log_level: default_log_level(),
                log_format: LogFormat::default(),
            },
            registrations: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from all sources
    ///
    /// Every config file found is merged, higher priority last, and
    /// environment variables override all of them.
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths();

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(RelayConfig::default()));

        // lowest priority first
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        let config: RelayConfig = figment.merge(Self::env()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the search path; environment variables still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "config file '{}' does not exist",
                path.display()
            )));
        }

        let config: RelayConfig = Figment::new()
            .merge(Serialized::defaults(RelayConfig::default()))
            .merge(Toml::file(path))
            .merge(Self::env())
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot be built
    pub fn validate(&self) -> Result<()> {
        for (index, registration) in self.registrations.iter().enumerate() {
            if registration.name.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "registration #{} has an empty name",
                    index + 1
                )));
            }
            if let BackendConfig::RemoteLog(remote) = &registration.backend {
                if remote.connect_timeout_ms == 0 {
                    return Err(Error::Configuration(format!(
                        "registration '{}': connect_timeout_ms must be positive",
                        registration.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__")
    }

    /// Config file candidates, highest priority first
    fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("audit-relay.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("audit-relay");
        if let Ok(path) = xdg_dirs.place_config_file("config.toml") {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/audit-relay/config.toml"));
        paths
    }
}
