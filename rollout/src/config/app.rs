//! Application description

use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::errors::RolloutError;

/// The application being released. Read-only for the whole invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppSpec {
    /// Application name, also the binary name and remote directory name
    pub name: String,

    /// Package passed to `go build` when no build command is set
    #[serde(default)]
    pub import_path: String,

    /// Files and directories shipped next to the binary
    #[serde(default)]
    pub files: Vec<FileSpec>,

    /// Exclusion rules applied to every entry of `files`
    #[serde(default)]
    pub default_excludeds: Vec<String>,

    /// Custom build command; output is expected at `tmp/<name>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_cmd: Option<String>,

    /// Signal used to stop the running process
    #[serde(default = "default_kill_sig")]
    pub kill_sig: String,

    /// Path to a deploy script template overriding the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_script: Option<String>,

    /// Path to a restart script template overriding the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_script: Option<String>,

    /// Arguments passed to the binary
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment of the running binary
    #[serde(default)]
    pub envs: BTreeMap<String, String>,
}

fn default_kill_sig() -> String {
    "TERM".to_string()
}

impl AppSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            import_path: String::new(),
            files: Vec::new(),
            default_excludeds: Vec::new(),
            build_cmd: None,
            kill_sig: default_kill_sig(),
            deploy_script: None,
            restart_script: None,
            args: Vec::new(),
            envs: BTreeMap::new(),
        }
    }

    /// Signal name without the `SIG` prefix, as accepted by `kill -s`
    pub fn signal(&self) -> &str {
        let sig = self.kill_sig.trim();
        sig.strip_prefix("SIG").unwrap_or(sig)
    }

    pub fn validate(&self) -> Result<(), RolloutError> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            || self.name.starts_with('.')
        {
            return Err(RolloutError::ConfigError(format!(
                "invalid app name {:?}: use letters, digits, '-', '_' or '.'",
                self.name
            )));
        }

        let sig = self.signal();
        if sig.is_empty() || !sig.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(RolloutError::ConfigError(format!(
                "invalid kill signal {:?}",
                self.kill_sig
            )));
        }

        for file in &self.files {
            ensure_relative_path(Path::new(&file.path))?;
        }

        validate_env_keys(&self.envs)
    }
}

/// One shipped path and its own exclusion rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFileSpec", rename_all = "PascalCase")]
pub struct FileSpec {
    pub path: String,
    pub excludeds: Vec<String>,
}

impl FileSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            excludeds: Vec::new(),
        }
    }

    pub fn excluding<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludeds.extend(rules.into_iter().map(Into::into));
        self
    }
}

/// `Files` entries may be a bare path or a full object
#[derive(Deserialize)]
#[serde(untagged)]
enum RawFileSpec {
    Path(String),
    Full {
        #[serde(rename = "Path")]
        path: String,
        #[serde(rename = "Excludeds", default)]
        excludeds: Vec<String>,
    },
}

impl From<RawFileSpec> for FileSpec {
    fn from(raw: RawFileSpec) -> Self {
        match raw {
            RawFileSpec::Path(path) => FileSpec::new(path),
            RawFileSpec::Full { path, excludeds } => FileSpec { path, excludeds },
        }
    }
}

fn ensure_relative_path(path: &Path) -> Result<(), RolloutError> {
    if path.as_os_str().is_empty() {
        return Err(RolloutError::ConfigError("empty path in Files".to_string()));
    }
    if path.is_absolute() {
        return Err(RolloutError::ConfigError(format!(
            "absolute paths are not allowed in Files: {}",
            path.display()
        )));
    }
    for component in path.components() {
        if let Component::ParentDir = component {
            return Err(RolloutError::ConfigError(format!(
                "path traversal is not allowed in Files: {}",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Environment keys end up in `export` statements
pub fn validate_env_keys(envs: &BTreeMap<String, String>) -> Result<(), RolloutError> {
    for key in envs.keys() {
        if !is_env_key(key) {
            return Err(RolloutError::ConfigError(format!(
                "invalid environment variable name {:?}",
                key
            )));
        }
    }
    Ok(())
}

pub fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
