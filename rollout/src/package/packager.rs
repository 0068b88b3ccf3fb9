//! Release packaging

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{AppSpec, FileSpec};
use crate::errors::RolloutError;
use crate::package::archive::{Archive, ArchiveBuilder};
use crate::package::excludes::ExcludeSet;

/// Bundles the binary and the configured files into one archive.
///
/// The binary lands at the archive root under the app name; every file spec
/// keeps its configured relative path.
pub struct Packager<'a> {
    root: PathBuf,
    app: &'a AppSpec,
}

impl<'a> Packager<'a> {
    pub fn new(root: impl Into<PathBuf>, app: &'a AppSpec) -> Self {
        Self {
            root: root.into(),
            app,
        }
    }

    /// Package synchronously; callers on the runtime use `spawn_blocking`
    pub fn package(&self, binary: &Path) -> Result<Archive, RolloutError> {
        let mut builder = ArchiveBuilder::new();
        builder.append_executable(&self.app.name, binary)?;

        for spec in &self.app.files {
            self.append_spec(&mut builder, spec)?;
        }

        let archive = builder.finish()?;
        info!(
            "Packaged {} ({} files, {} bytes, sha256 {})",
            self.app.name,
            archive.entries(),
            archive.bytes().len(),
            &archive.digest()[..12]
        );
        Ok(archive)
    }

    fn append_spec(&self, builder: &mut ArchiveBuilder, spec: &FileSpec) -> Result<(), RolloutError> {
        let base = normalize(&spec.path);
        let source = self.root.join(&base);
        let metadata = std::fs::metadata(&source).map_err(|e| {
            RolloutError::PackagingError(format!("{}: {}", source.display(), e))
        })?;

        let excludes = ExcludeSet::new(
            spec.excludeds
                .iter()
                .chain(self.app.default_excludeds.iter()),
        )
        .map_err(|e| RolloutError::PackagingError(e.to_string()))?;

        if metadata.is_file() {
            let name = base.rsplit('/').next().unwrap_or(&base);
            if !excludes.is_excluded(name) {
                builder.append_file(&base, &source)?;
            }
            return Ok(());
        }

        let walker = WalkDir::new(&source)
            .follow_links(true)
            .sort_by_file_name()
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| {
                let Some(rel) = relative(&source, entry.path()) else {
                    return false;
                };
                let rel = if entry.file_type().is_dir() {
                    format!("{}/", rel)
                } else {
                    rel
                };
                let excluded = excludes.is_excluded(&rel);
                if excluded {
                    debug!("Excluding {}", archive_name(&base, &rel));
                }
                !excluded
            });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = relative(&source, entry.path()) else {
                continue;
            };
            builder.append_file(&archive_name(&base, &rel), entry.path())?;
        }

        Ok(())
    }
}

/// Relative spec path without `./` or trailing `/`; the project root is ""
fn normalize(path: &str) -> String {
    let path = path.trim_start_matches("./").trim_end_matches('/');
    if path == "." {
        String::new()
    } else {
        path.to_string()
    }
}

fn archive_name(base: &str, rel: &str) -> String {
    if base.is_empty() {
        rel.to_string()
    } else {
        format!("{}/{}", base, rel)
    }
}

/// `/` separated path of `path` below `root`
fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
