//! Uncompressed directory layout for older tooling.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{SupError, SupResult};

use super::ArchiveFormat;

/// Publishes the staged tree as a plain directory at the package path.
///
/// Opening does not copy anything: the package directory already is the
/// content root.
#[derive(Debug, Default)]
pub struct LegacyDirectoryFormat;

impl LegacyDirectoryFormat {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveFormat for LegacyDirectoryFormat {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn write(
        &self,
        staging_dir: &Path,
        package_path: &Path,
        _temp_dir: Option<&Path>,
    ) -> SupResult<()> {
        copy_tree(staging_dir, package_path)
    }

    fn open(&self, package_path: &Path, _target_dir: &Path) -> SupResult<PathBuf> {
        if !package_path.is_dir() {
            return Err(SupError::InvalidPackage(format!(
                "{} is not a package directory",
                package_path.display()
            )));
        }
        Ok(package_path.to_path_buf())
    }
}

/// Recursively copy `source` to `destination`.
fn copy_tree(source: &Path, destination: &Path) -> SupResult<()> {
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| SupError::ReadFailed {
            path: source.to_path_buf(),
            source: e.into(),
        })?;
        let relative = entry.path().strip_prefix(source).map_err(|e| {
            SupError::InvalidPackage(format!("{}: {}", entry.path().display(), e))
        })?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| SupError::CreateDirFailed {
                path: target.clone(),
                source: e,
            })?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| SupError::WriteFailed {
                path: target.clone(),
                source: e,
            })?;
        }
    }
    Ok(())
}
