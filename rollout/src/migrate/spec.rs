//! Migration program specifications

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::app::is_env_key;
use crate::errors::RolloutError;
use crate::session::{shell, Env};

/// One ad-hoc program: `[K=V ...] SOURCE [ARGS ...]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSpec {
    /// File or package built into the program
    pub source: String,

    /// Environment merged over the server's
    pub envs: Env,

    pub args: Vec<String>,
}

impl MigrationSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            envs: Env::new(),
            args: Vec::new(),
        }
    }

    /// Base name of the program: file stem or last path segment
    pub fn base_name(&self) -> String {
        let last = self
            .source
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let stem = last.strip_suffix(".go").unwrap_or(last);
        let name: String = stem
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        match name.trim_start_matches('.') {
            "" => "migration".to_string(),
            name => name.to_string(),
        }
    }
}

impl FromStr for MigrationSpec {
    type Err = RolloutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut envs = Env::new();
        let mut tokens = s.split_whitespace().peekable();

        while let Some((key, value)) = tokens.peek().copied().and_then(|t| t.split_once('=')) {
            if !is_env_key(key) {
                break;
            }
            envs.insert(key.to_string(), value.to_string());
            tokens.next();
        }

        let source = tokens.next().ok_or_else(|| {
            RolloutError::ConfigError(format!("migration {:?} names no program", s))
        })?;

        Ok(Self {
            source: source.to_string(),
            envs,
            args: tokens.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for MigrationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.envs {
            write!(f, "{}={} ", key, shell::quote(value))?;
        }
        f.write_str(&self.source)?;
        for arg in &self.args {
            write!(f, " {}", shell::quote(arg))?;
        }
        Ok(())
    }
}

/// Unique program names, in spec order; a taken name gets the first free
/// `-2`, `-3`, ... suffix
pub fn program_names(specs: &[MigrationSpec]) -> Vec<String> {
    let mut issued: HashSet<String> = HashSet::new();
    specs
        .iter()
        .map(|spec| {
            let base = spec.base_name();
            let mut name = base.clone();
            let mut suffix = 2;
            while issued.contains(&name) {
                name = format!("{}-{}", base, suffix);
                suffix += 1;
            }
            issued.insert(name.clone());
            name
        })
        .collect()
}
