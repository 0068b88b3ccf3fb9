//! Local files

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::errors::RolloutError;

#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    pub async fn read_string(&self) -> Result<String, RolloutError> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, RolloutError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Write JSON to file, refusing to overwrite an existing one
    pub async fn create_json<T: Serialize>(&self, value: &T) -> Result<(), RolloutError> {
        if self.exists().await {
            return Err(RolloutError::ConfigError(format!(
                "{} already exists",
                self.path.display()
            )));
        }
        let contents = serde_json::to_string_pretty(value)?;
        self.write_atomic(contents.as_bytes()).await
    }

    /// Write through a sibling temp file renamed into place, so readers
    /// never see a partial file
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), RolloutError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));

        let mut file = fs::File::create(&temp_path).await?;
        if let Err(e) = async {
            file.write_all(contents).await?;
            file.sync_all().await
        }
        .await
        {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
