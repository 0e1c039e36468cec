use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::irc::connection::LivenessConfig;
use crate::state::{Account, Role, State};

/// Top-level gateway configuration, loaded from channels.toml.
#[derive(Deserialize, Default, Debug)]
#[serde(default)]
pub struct ServerConfig {
    pub gateway: GatewaySection,
    pub accounts: Vec<AccountSection>,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct GatewaySection {
    /// Identity sent in PING and used as the reply prefix.
    pub name: String,
    pub irc_address: String,
    pub ping_frequency_secs: u64,
    pub pong_max_latency_secs: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            name: "channels".into(),
            irc_address: "0.0.0.0:6667".into(),
            ping_frequency_secs: 60,
            pong_max_latency_secs: 30,
        }
    }
}

/// An account seeded into the state store at startup.
#[derive(Deserialize, Debug, Clone)]
pub struct AccountSection {
    pub name: String,
    /// argon2 PHC string, as printed by `channels-gateway hash-password`.
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_string(),
                source,
            })?;
            Self::from_toml(path, &contents)?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_toml(path: &str, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GATEWAY_NAME") {
            self.gateway.name = v;
        }
        if let Ok(v) = std::env::var("IRC_ADDRESS") {
            self.gateway.irc_address = v;
        }
        if let Ok(v) = std::env::var("PING_FREQUENCY")
            && let Ok(secs) = v.parse()
        {
            self.gateway.ping_frequency_secs = secs;
        }
        if let Ok(v) = std::env::var("PONG_MAX_LATENCY")
            && let Ok(secs) = v.parse()
        {
            self.gateway.pong_max_latency_secs = secs;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.name.is_empty() || self.gateway.name.contains(' ') {
            return Err(ConfigError::Invalid(format!(
                "gateway name {:?} must be a single non-empty token",
                self.gateway.name
            )));
        }
        if self.gateway.ping_frequency_secs == 0 {
            return Err(ConfigError::Invalid("ping_frequency_secs must be > 0".into()));
        }
        if self.gateway.pong_max_latency_secs == 0 {
            return Err(ConfigError::Invalid(
                "pong_max_latency_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Liveness settings handed to every connection.
    pub fn to_liveness_config(&self) -> LivenessConfig {
        LivenessConfig {
            name: self.gateway.name.clone(),
            ping_frequency: Duration::from_secs(self.gateway.ping_frequency_secs),
            pong_max_latency: Duration::from_secs(self.gateway.pong_max_latency_secs),
        }
    }

    /// Build the state store, seeded with the configured accounts.
    pub fn to_state(&self) -> State {
        let mut state = State::new(self.gateway.name.clone());
        for account in &self.accounts {
            state.add_account(Account {
                name: account.name.clone(),
                password_hash: account.password_hash.clone(),
                roles: account.roles.iter().map(|r| Role::parse(r)).collect(),
            });
        }
        info!(count = self.accounts.len(), "loaded accounts");
        state
    }
}
