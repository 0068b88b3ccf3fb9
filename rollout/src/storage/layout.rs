//! Storage layout configuration

use std::path::{Path, PathBuf};

use crate::config::ServerSpec;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Local build output, relative to the project directory
#[derive(Debug, Clone)]
pub struct LocalLayout {
    /// Base directory for build output
    pub base_dir: PathBuf,
}

impl LocalLayout {
    /// Create a new local layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Layout rooted at `<project>/tmp`
    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(project_dir.join("tmp"))
    }

    /// Get the built application binary
    pub fn binary_file(&self, app: &str) -> File {
        File::new(self.base_dir.join(app))
    }

    /// Get the local copy of the release archive
    pub fn release_archive_file(&self, app: &str) -> File {
        File::new(self.base_dir.join(format!("{}.tar.gz", app)))
    }

    /// Get the directory of built migration programs
    pub fn migrations_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("migrations"))
    }

    /// Get the local copy of the migration archive
    pub fn migration_archive_file(&self) -> File {
        File::new(self.base_dir.join("migrations.tar.gz"))
    }
}

/// Per-app layout on a server, relative to the remote home directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    app: String,
}

impl RemoteLayout {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into() }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// Get the app root, `rollout/<app>`
    pub fn root(&self) -> String {
        format!("rollout/{}", self.app)
    }

    /// Get the releases directory
    pub fn releases_dir(&self) -> String {
        format!("{}/releases", self.root())
    }

    /// Get the directory of one release
    pub fn release_dir(&self, tag: &str) -> String {
        format!("{}/{}", self.releases_dir(), tag)
    }

    /// Get the active release pointer
    pub fn current_file(&self) -> String {
        format!("{}/current", self.root())
    }

    /// Get the upload target of release archives
    pub fn release_archive(&self) -> String {
        format!("{}/release.tar.gz", self.root())
    }

    /// Get the persisted migration archive
    pub fn migration_archive(&self) -> String {
        format!("{}/migrations.tar.gz", self.root())
    }

    /// Get the directory migrations are extracted to
    pub fn migrations_dir(&self) -> String {
        format!("{}/migrations", self.root())
    }

    /// Get the saved restart script
    pub fn restart_script(&self) -> String {
        format!("{}/restart.sh", self.root())
    }

    /// Get the rollback helper script
    pub fn rollback_script(&self) -> String {
        format!("{}/rollback.sh", self.root())
    }

    /// Get the log directory of a server
    pub fn log_dir(&self, server: &ServerSpec) -> String {
        non_empty_or(&server.log_dir, || format!("{}/log", self.root()))
    }

    /// Get the pid directory of a server
    pub fn pid_dir(&self, server: &ServerSpec) -> String {
        non_empty_or(&server.pid_dir, || format!("{}/pid", self.root()))
    }

    /// Get the log file of a server
    pub fn log_file(&self, server: &ServerSpec) -> String {
        format!("{}/{}.log", self.log_dir(server), self.app)
    }

    /// Get the pid file of a server
    pub fn pid_file(&self, server: &ServerSpec) -> String {
        format!("{}/{}.pid", self.pid_dir(server), self.app)
    }
}

fn non_empty_or(value: &str, default: impl FnOnce() -> String) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        default()
    } else {
        trimmed.to_string()
    }
}
