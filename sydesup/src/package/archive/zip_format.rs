//! Zip container, the default package format.

use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::{SupError, SupResult};

use super::ArchiveFormat;

/// Writes the staged tree as a single zip file.
///
/// Entries are added in sorted order with a fixed timestamp, so identical
/// staged trees produce identical archives.
#[derive(Debug, Default)]
pub struct ZipFormat;

impl ZipFormat {
    pub fn new() -> Self {
        Self
    }

    fn archive_error(path: &Path, reason: impl std::fmt::Display) -> SupError {
        SupError::ArchiveFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    fn write_entries<W: Write + Seek>(
        &self,
        staging_dir: &Path,
        writer: &mut ZipWriter<W>,
        package_path: &Path,
    ) -> SupResult<usize> {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);
        let dir_options = options.unix_permissions(0o755);

        let mut count = 0;
        for entry in WalkDir::new(staging_dir).sort_by_file_name().min_depth(1) {
            let entry = entry.map_err(|e| SupError::ReadFailed {
                path: staging_dir.to_path_buf(),
                source: e.into(),
            })?;
            let relative = entry
                .path()
                .strip_prefix(staging_dir)
                .map_err(|e| Self::archive_error(package_path, e))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if entry.file_type().is_dir() {
                writer
                    .add_directory(name, dir_options)
                    .map_err(|e| Self::archive_error(package_path, e))?;
                continue;
            }

            writer
                .start_file(name, options)
                .map_err(|e| Self::archive_error(package_path, e))?;
            let mut source = File::open(entry.path()).map_err(|e| SupError::ReadFailed {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
            io::copy(&mut source, writer).map_err(|e| SupError::WriteFailed {
                path: package_path.to_path_buf(),
                source: e,
            })?;
            count += 1;
        }
        Ok(count)
    }
}

impl ArchiveFormat for ZipFormat {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn write(
        &self,
        staging_dir: &Path,
        package_path: &Path,
        temp_dir: Option<&Path>,
    ) -> SupResult<()> {
        let work_dir = match temp_dir {
            Some(dir) => dir.to_path_buf(),
            None => package_path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".sup-")
            .suffix(".zip.tmp")
            .tempfile_in(&work_dir)
            .map_err(|e| SupError::WriteFailed {
                path: work_dir.clone(),
                source: e,
            })?;

        let mut writer = ZipWriter::new(temp.as_file_mut());
        let count = self.write_entries(staging_dir, &mut writer, package_path)?;
        writer
            .finish()
            .map_err(|e| Self::archive_error(package_path, e))?;
        drop(writer);

        // persist() cannot cross filesystems; fall back to a copy.
        if let Err(err) = temp.persist(package_path) {
            tracing::debug!(error = %err.error, "Rename failed, copying archive instead");
            fs::copy(err.file.path(), package_path).map_err(|e| SupError::WriteFailed {
                path: package_path.to_path_buf(),
                source: e,
            })?;
        }

        tracing::debug!(files = count, package = %package_path.display(), "Zip archive written");
        Ok(())
    }

    fn open(&self, package_path: &Path, target_dir: &Path) -> SupResult<PathBuf> {
        let file = File::open(package_path).map_err(|e| SupError::ReadFailed {
            path: package_path.to_path_buf(),
            source: e,
        })?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| Self::archive_error(package_path, e))?;
        archive
            .extract(target_dir)
            .map_err(|e| Self::archive_error(package_path, e))?;

        tracing::debug!(
            entries = archive.len(),
            target = %target_dir.display(),
            "Zip archive extracted"
        );
        Ok(target_dir.to_path_buf())
    }
}
