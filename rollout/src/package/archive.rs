//! Gzipped tar archives built in memory

use std::path::Path;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::RolloutError;
use crate::utils::sha256_hash;

/// A finished archive, cheap to share between workers
#[derive(Debug, Clone)]
pub struct Archive {
    bytes: Arc<Vec<u8>>,
    digest: String,
    entries: usize,
}

impl Archive {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 of the compressed bytes
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Number of files in the archive
    pub fn entries(&self) -> usize {
        self.entries
    }
}

/// Collects files into a tar.gz
pub struct ArchiveBuilder {
    builder: tar::Builder<GzEncoder<Vec<u8>>>,
    entries: usize,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.mode(tar::HeaderMode::Deterministic);
        builder.follow_symlinks(true);
        Self {
            builder,
            entries: 0,
        }
    }

    /// Add a local file, keeping its permissions
    pub fn append_file(&mut self, name: &str, local: &Path) -> Result<(), RolloutError> {
        let mut file = std::fs::File::open(local).map_err(|e| {
            RolloutError::PackagingError(format!("unable to read {}: {}", local.display(), e))
        })?;
        self.builder.append_file(name, &mut file).map_err(|e| {
            RolloutError::PackagingError(format!("unable to archive {}: {}", local.display(), e))
        })?;
        self.entries += 1;
        Ok(())
    }

    /// Add a local file as an executable
    pub fn append_executable(&mut self, name: &str, local: &Path) -> Result<(), RolloutError> {
        let data = std::fs::read(local).map_err(|e| {
            RolloutError::PackagingError(format!("unable to read {}: {}", local.display(), e))
        })?;
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_mtime(0);
        header.set_entry_type(tar::EntryType::Regular);
        self.builder
            .append_data(&mut header, name, data.as_slice())
            .map_err(|e| {
                RolloutError::PackagingError(format!("unable to archive {}: {}", local.display(), e))
            })?;
        self.entries += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<Archive, RolloutError> {
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| RolloutError::PackagingError(e.to_string()))?;
        let bytes = encoder
            .finish()
            .map_err(|e| RolloutError::PackagingError(e.to_string()))?;
        Ok(Archive {
            digest: sha256_hash(&bytes),
            bytes: Arc::new(bytes),
            entries: self.entries,
        })
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}
