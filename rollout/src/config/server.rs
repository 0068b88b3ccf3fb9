//! Server description and addressing

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::app::validate_env_keys;
use crate::errors::RolloutError;

/// One deployment target. Identity is `User@Host:Port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerSpec {
    #[serde(default)]
    pub user: String,

    pub host: String,

    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: u16,

    /// Environment exported for every program started on this server
    #[serde(default)]
    pub envs: BTreeMap<String, String>,

    #[serde(default)]
    pub go_path: String,

    /// Log directory; defaults to `rollout/<app>/log` under the remote home
    #[serde(default)]
    pub log_dir: String,

    /// Pid directory; defaults to `rollout/<app>/pid` under the remote home
    #[serde(default, rename = "PIDDir")]
    pub pid_dir: String,

    /// Name of the server set this server was declared in
    #[serde(default)]
    pub set: String,
}

fn default_port() -> u16 {
    22
}

/// Ports are written either as numbers or as `":22"` strings
fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        Text(String),
    }

    match PortValue::deserialize(deserializer)? {
        PortValue::Number(port) => Ok(port),
        PortValue::Text(text) => parse_port(&text).map_err(serde::de::Error::custom),
    }
}

fn parse_port(text: &str) -> Result<u16, String> {
    let trimmed = text.trim().trim_start_matches(':');
    if trimmed.is_empty() {
        return Ok(default_port());
    }
    trimmed
        .parse()
        .map_err(|_| format!("invalid port {:?}", text))
}

impl ServerSpec {
    pub fn new(user: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port,
            envs: BTreeMap::new(),
            go_path: String::new(),
            log_dir: String::new(),
            pid_dir: String::new(),
            set: String::new(),
        }
    }

    pub fn addr(&self) -> ServerAddr {
        ServerAddr {
            user: self.user.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// Identity string, `User@Host:Port`
    pub fn id(&self) -> String {
        self.addr().to_string()
    }

    /// Destination passed to ssh, `User@Host` or `Host`
    pub fn destination(&self) -> String {
        if self.user.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }

    pub fn validate(&self) -> Result<(), RolloutError> {
        if self.host.trim().is_empty() {
            return Err(RolloutError::ConfigError(format!(
                "server in set {:?} has no Host",
                self.set
            )));
        }
        if self.host.starts_with('-') || self.user.starts_with('-') {
            return Err(RolloutError::ConfigError(format!(
                "invalid server address {}",
                self.id()
            )));
        }
        validate_env_keys(&self.envs)
    }
}

/// Parsed `User@Host:Port` address used to pick a single server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.user.is_empty() {
            write!(f, "{}:{}", self.host, self.port)
        } else {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        }
    }
}

impl FromStr for ServerAddr {
    type Err = RolloutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) => (user.to_string(), rest),
            None => (String::new(), s),
        };
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(port).map_err(RolloutError::ConfigError)?),
            None => (rest, default_port()),
        };
        if host.is_empty() {
            return Err(RolloutError::ConfigError(format!(
                "invalid server address {:?}, expected User@Host:Port",
                s
            )));
        }
        Ok(ServerAddr {
            user,
            host: host.to_string(),
            port,
        })
    }
}
