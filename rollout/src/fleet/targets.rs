//! Target resolution

use std::collections::HashSet;
use std::str::FromStr;

use crate::config::{Config, ServerAddr, ServerSpec};
use crate::errors::RolloutError;

/// Names a group of targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// Every member of a server set
    Set(String),

    /// One server, by `User@Host:Port`
    Server(String),
}

/// Resolve selectors into a deduplicated, ordered target list
pub fn resolve_targets(
    config: &Config,
    selectors: &[TargetSelector],
) -> Result<Vec<ServerSpec>, RolloutError> {
    if selectors.is_empty() {
        return Err(RolloutError::ConfigError(
            "no targets: pass -s SET or --server USER@HOST:PORT".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for selector in selectors {
        for server in select(config, selector)? {
            if seen.insert(server.id()) {
                targets.push(server);
            }
        }
    }
    Ok(targets)
}

fn select(config: &Config, selector: &TargetSelector) -> Result<Vec<ServerSpec>, RolloutError> {
    match selector {
        TargetSelector::Set(name) => config
            .servers
            .get(name)
            .filter(|servers| !servers.is_empty())
            .cloned()
            .ok_or_else(|| {
                let known: Vec<&str> = config.servers.keys().map(String::as_str).collect();
                RolloutError::ConfigError(format!(
                    "unknown server set {:?} (known: {})",
                    name,
                    known.join(", ")
                ))
            }),
        TargetSelector::Server(addr) => {
            let wanted = ServerAddr::from_str(addr)?;
            config
                .servers
                .values()
                .flatten()
                .find(|server| server.addr() == wanted)
                .cloned()
                .map(|server| vec![server])
                .ok_or_else(|| RolloutError::ConfigError(format!("unknown server {}", addr)))
        }
    }
}
