//! Root configuration file

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::build::Platform;
use crate::config::app::{AppSpec, FileSpec};
use crate::config::server::ServerSpec;
use crate::errors::RolloutError;
use crate::filesys::file::File;
use crate::release::Retention;

/// Default configuration file name
pub const CONFIG_FILE: &str = "rollout.json";

/// Contents of `rollout.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Target operating system for the build
    #[serde(default = "default_goos", rename = "GOOS")]
    pub goos: String,

    /// Target architecture for the build
    #[serde(default = "default_goarch", rename = "GOARCH")]
    pub goarch: String,

    /// Keep only the active release on each server
    #[serde(default)]
    pub no_rollback: bool,

    /// Number of releases kept per server when rollback is enabled
    #[serde(default = "default_rollback_count")]
    pub rollback_count: usize,

    pub app: AppSpec,

    /// Server sets, keyed by set name
    #[serde(default)]
    pub servers: BTreeMap<String, Vec<ServerSpec>>,
}

fn default_goos() -> String {
    "linux".to_string()
}

fn default_goarch() -> String {
    "amd64".to_string()
}

fn default_rollback_count() -> usize {
    3
}

impl Config {
    /// Load and validate a configuration file
    pub async fn load(file: &File) -> Result<Self, RolloutError> {
        debug!("Loading configuration from {}", file.path().display());
        let mut config: Config = file.read_json().await.map_err(|e| {
            RolloutError::ConfigError(format!("unable to read {}: {}", file.path().display(), e))
        })?;
        config.assign_sets();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, RolloutError> {
        let mut config: Config = serde_json::from_str(json)
            .map_err(|e| RolloutError::ConfigError(e.to_string()))?;
        config.assign_sets();
        config.validate()?;
        Ok(config)
    }

    /// Every server remembers the set it was declared in
    pub fn assign_sets(&mut self) {
        for (name, servers) in self.servers.iter_mut() {
            for server in servers.iter_mut() {
                server.set = name.clone();
            }
        }
    }

    pub fn validate(&self) -> Result<(), RolloutError> {
        self.app.validate()?;

        if !self.no_rollback && self.rollback_count == 0 {
            return Err(RolloutError::ConfigError(
                "RollbackCount must be at least 1 (set NoRollback to disable rollback)"
                    .to_string(),
            ));
        }

        for (name, servers) in &self.servers {
            let mut seen = HashSet::new();
            for server in servers {
                server.validate()?;
                if !seen.insert(server.id()) {
                    return Err(RolloutError::ConfigError(format!(
                        "server {} is listed twice in set {:?}",
                        server.id(),
                        name
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn retention(&self) -> Retention {
        if self.no_rollback {
            Retention::ActiveOnly
        } else {
            Retention::Keep(self.rollback_count)
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            os: self.goos.clone(),
            arch: self.goarch.clone(),
        }
    }

    /// Starter configuration written by `rollout init`
    pub fn starter(app_name: &str) -> Self {
        let mut app = AppSpec::new(app_name);
        app.import_path = ".".to_string();
        app.default_excludeds = vec![
            ".git/".to_string(),
            "tmp/".to_string(),
            ".DS_Store".to_string(),
            "node_modules/".to_string(),
        ];
        app.files = vec![FileSpec::new("static")];

        let mut servers = BTreeMap::new();
        servers.insert(
            "dev".to_string(),
            vec![ServerSpec::new("app", "192.168.59.102", 22)],
        );
        servers.insert(
            "prod".to_string(),
            vec![
                ServerSpec::new("app", "192.168.59.103", 22),
                ServerSpec::new("app", "192.168.59.104", 22),
            ],
        );

        let mut config = Config {
            goos: default_goos(),
            goarch: default_goarch(),
            no_rollback: false,
            rollback_count: default_rollback_count(),
            app,
            servers,
        };
        config.assign_sets();
        config
    }
}
