//! CLI error type and exit codes.

use std::fmt;

use sydesup::package::{PackageFailure, PackageStatus};

/// Exit code for a project or view that could not be loaded.
pub const EXIT_LOAD_FAILED: i32 = 2;
/// Exit code for filesystem or archive failures.
pub const EXIT_READ_WRITE_FAILED: i32 = 3;
/// Exit code for configuration problems in the project or the package.
pub const EXIT_CONFIGURATION_FAILED: i32 = 4;
/// Exit code for packages that need a different loader.
pub const EXIT_USE_DIFFERENT_LOADER: i32 = 5;

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Tool configuration could not be loaded.
    Config(String),
    /// Logging could not be set up.
    Logging(String),
    /// Package creation or unpacking failed.
    Package(PackageFailure),
    /// The package was written in an older format.
    UseDifferentLoader { file_version: u32 },
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Logging(_) => EXIT_LOAD_FAILED,
            CliError::Package(failure) => match failure.status {
                PackageStatus::LoadFailed => EXIT_LOAD_FAILED,
                PackageStatus::ReadWriteFailed => EXIT_READ_WRITE_FAILED,
                PackageStatus::ConfigurationFailed => EXIT_CONFIGURATION_FAILED,
            },
            CliError::UseDifferentLoader { .. } => EXIT_USE_DIFFERENT_LOADER,
        }
    }

    /// Warnings to show next to the error.
    pub fn warnings(&self) -> &[String] {
        match self {
            CliError::Package(failure) => &failure.warnings,
            _ => &[],
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "Logging setup failed: {}", msg),
            CliError::Package(failure) => write!(f, "{}", failure),
            CliError::UseDifferentLoader { file_version } => write!(
                f,
                "Package file version {} is not supported by this loader, use a legacy loader",
                file_version
            ),
        }
    }
}

impl std::error::Error for CliError {}

impl From<PackageFailure> for CliError {
    fn from(failure: PackageFailure) -> Self {
        CliError::Package(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            CliError::Config("x".into()).exit_code(),
            EXIT_READ_WRITE_FAILED,
            EXIT_CONFIGURATION_FAILED,
            CliError::UseDifferentLoader { file_version: 2 }.exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
    }

    #[test]
    fn test_use_different_loader_message() {
        let err = CliError::UseDifferentLoader { file_version: 2 };
        assert!(err.to_string().contains("version 2"));
        assert!(err.warnings().is_empty());
    }
}
