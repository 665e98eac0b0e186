//! Error types for package creation and unpacking.
//!
//! Every failure carries enough context (node name, file path) to be
//! attributed to the part of the system definition that caused it. The
//! [`ErrorKind`] grouping is what the orchestrator translates into the
//! caller-facing [`PackageStatus`](crate::package::PackageStatus).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for package operations.
pub type SupResult<T> = Result<T, SupError>;

/// Coarse classification of a [`SupError`].
///
/// Callers use this to pick remediation advice: "fix your project" for
/// configuration problems, "fix your filesystem" for I/O problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Project or view data could not be loaded.
    Input,
    /// Filesystem or archive container failure.
    Io,
    /// Structural problem in the system definition or package content.
    Configuration,
    /// Package was written by an older tool and needs a different loader.
    VersionMismatch,
}

/// Errors that can occur while creating or unpacking a package.
#[derive(Debug, Error)]
pub enum SupError {
    /// Project file could not be read or parsed.
    #[error("failed to load project {path}: {reason}")]
    ProjectLoad { path: PathBuf, reason: String },

    /// The requested view is not part of the project.
    #[error("view \"{0}\" does not exist in the project")]
    ViewNotFound(String),

    /// Failed to read a file or directory.
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    #[error("failed to write {path}: {source}")]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {path}: {source}")]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// An existing package or unpack target could not be removed.
    #[error("could not remove existing {path}: {source}")]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// Removing an existing package or unpack target would also delete
    /// content the operation still needs.
    #[error("refusing to remove {path}: it contains {protected}")]
    RemovalConflict { path: PathBuf, protected: PathBuf },

    /// The directory that should receive the package is not usable.
    #[error("target directory {0} is not writable")]
    TargetNotWritable(PathBuf),

    /// Zip container could not be written or read.
    #[error("archive operation failed for {path}: {reason}")]
    ArchiveFailed { path: PathBuf, reason: String },

    /// System definition and view data do not fit together.
    #[error("invalid system definition: {0}")]
    InvalidSystemDefinition(String),

    /// A single node's update configuration is unusable.
    #[error("node \"{node}\": {reason}")]
    NodeConfiguration { node: String, reason: String },

    /// A file referenced by a node does not exist.
    #[error("node \"{node}\": file {path} does not exist")]
    MissingFile { node: String, path: PathBuf },

    /// Package content is malformed.
    #[error("invalid package content: {0}")]
    InvalidPackage(String),

    /// A packaged file does not match the digest recorded at build time.
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: PathBuf,
        expected: String,
        actual: String,
    },

    /// Package was written with a newer, unknown definition format.
    #[error("package file version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Package was written with an older definition format.
    #[error("package file version {found} requires a different loader (current version {current})")]
    OlderFileVersion { found: u32, current: u32 },
}

impl SupError {
    /// Classify this error for status reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProjectLoad { .. } | Self::ViewNotFound(_) => ErrorKind::Input,
            Self::ReadFailed { .. }
            | Self::WriteFailed { .. }
            | Self::CreateDirFailed { .. }
            | Self::RemoveFailed { .. }
            | Self::TargetNotWritable(_)
            | Self::ArchiveFailed { .. } => ErrorKind::Io,
            Self::InvalidSystemDefinition(_)
            | Self::NodeConfiguration { .. }
            | Self::MissingFile { .. }
            | Self::InvalidPackage(_)
            | Self::RemovalConflict { .. }
            | Self::ChecksumMismatch { .. }
            | Self::UnsupportedVersion { .. } => ErrorKind::Configuration,
            Self::OlderFileVersion { .. } => ErrorKind::VersionMismatch,
        }
    }

    pub(crate) fn node(node: &str, reason: impl Into<String>) -> Self {
        Self::NodeConfiguration {
            node: node.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_node_configuration_display_names_node() {
        let err = SupError::node("ECU_Gateway", "no Data Block of type HALC parameter set");
        assert_eq!(
            err.to_string(),
            "node \"ECU_Gateway\": no Data Block of type HALC parameter set"
        );
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = SupError::ChecksumMismatch {
            file: PathBuf::from("000_ECU/flash_00/app.hex"),
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_kind_mapping() {
        let io_err = SupError::WriteFailed {
            path: PathBuf::from("/pkg.syde_sup"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(io_err.kind(), ErrorKind::Io);
        assert!(io_err.source().is_some());

        assert_eq!(
            SupError::ViewNotFound("Main".to_string()).kind(),
            ErrorKind::Input
        );
        assert_eq!(
            SupError::MissingFile {
                node: "n".to_string(),
                path: PathBuf::from("x.hex")
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            SupError::OlderFileVersion {
                found: 2,
                current: 3
            }
            .kind(),
            ErrorKind::VersionMismatch
        );
    }
}
