//! Local directories

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::RolloutError;
use crate::filesys::file::File;

#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory and its parents; an existing directory is fine
    pub async fn create(&self) -> Result<(), RolloutError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Start over with an empty directory
    pub async fn recreate(&self) -> Result<(), RolloutError> {
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.create().await
    }

    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }
}
