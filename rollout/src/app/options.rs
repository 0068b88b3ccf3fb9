//! Invocation options

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::settings::CONFIG_FILE;
use crate::session::{LocalProvider, SessionProvider, SshOptions, SshProvider};

/// How sessions reach servers
#[derive(Debug, Clone)]
pub enum Transport {
    /// The system ssh client
    Ssh(SshOptions),

    /// Local directories standing in for servers, rooted at the path
    Local(PathBuf),
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Ssh(SshOptions::default())
    }
}

impl Transport {
    pub fn provider(&self) -> Arc<dyn SessionProvider> {
        match self {
            Transport::Ssh(options) => Arc::new(SshProvider::new(options.clone())),
            Transport::Local(root) => Arc::new(LocalProvider::new(root.clone())),
        }
    }
}

/// Main invocation options
#[derive(Debug, Clone)]
pub struct RolloutOptions {
    /// Project directory; builds run and files are read here
    pub project_dir: PathBuf,

    /// Configuration file, relative to the project directory unless absolute
    pub config_file: PathBuf,

    pub transport: Transport,
}

impl Default for RolloutOptions {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            config_file: PathBuf::from(CONFIG_FILE),
            transport: Transport::default(),
        }
    }
}

impl RolloutOptions {
    pub fn config_path(&self) -> PathBuf {
        if self.config_file.is_absolute() {
            self.config_file.clone()
        } else {
            self.project_dir.join(&self.config_file)
        }
    }
}
