// Namespace configuration sourced from environment variables with an optional YAML override.
use anyhow::{Context, Result};
use sable_transport::DEFAULT_MAX_SESSIONS;
use serde::Deserialize;
use std::fs;

pub const CONNECTION_STRING_ENV: &str = "SABLE_CONNECTION_STRING";
pub const ENVIRONMENT_ENV: &str = "SABLE_ENVIRONMENT";
pub const MAX_SESSIONS_ENV: &str = "SABLE_MAX_SESSIONS";
pub const CONFIG_PATH_ENV: &str = "SABLE_CLIENT_CONFIG";

#[derive(Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    pub connection_string: Option<String>,
    // Canonical cloud name, e.g. `AzurePublicCloud`.
    pub environment: Option<String>,
    pub max_sessions: u16,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            environment: None,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl std::fmt::Debug for NamespaceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceConfig")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("environment", &self.environment)
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct NamespaceConfigOverride {
    connection_string: Option<String>,
    environment: Option<String>,
    max_sessions: Option<u16>,
}

impl NamespaceConfig {
    /// Load defaults, then environment variables, then the YAML file at
    /// `config_path` (or `SABLE_CLIENT_CONFIG`) if one is given.
    pub fn from_env_or_yaml(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::from_env();
        let override_path = config_path
            .map(|value| value.to_string())
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok());
        if let Some(path) = override_path.as_deref() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read client config: {path}"))?;
            let override_cfg: NamespaceConfigOverride =
                serde_yaml::from_str(&contents).context("parse client config yaml")?;
            override_cfg.apply(&mut config);
        }
        Ok(config)
    }

    fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = read_string_env(CONNECTION_STRING_ENV) {
            config.connection_string = Some(value);
        }
        if let Some(value) = read_string_env(ENVIRONMENT_ENV) {
            config.environment = Some(value);
        }
        if let Some(value) = read_u16_env(MAX_SESSIONS_ENV) {
            config.max_sessions = value;
        }
        config
    }
}

impl NamespaceConfigOverride {
    fn apply(self, config: &mut NamespaceConfig) {
        if let Some(value) = self.connection_string
            && !value.trim().is_empty()
        {
            config.connection_string = Some(value);
        }
        if let Some(value) = self.environment
            && !value.trim().is_empty()
        {
            config.environment = Some(value);
        }
        if let Some(value) = self.max_sessions
            && value > 0
        {
            config.max_sessions = value;
        }
    }
}

fn read_string_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_u16_env(key: &str) -> Option<u16> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
}
