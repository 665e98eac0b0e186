//! SHA-256 digests of packaged files.
//!
//! The definition records a digest for every file so the unpacking side can
//! detect truncated or altered content before anything is flashed.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{SupError, SupResult};

/// Lowercase hex SHA-256 of a file.
pub fn calculate_file_checksum(path: &Path) -> SupResult<String> {
    let read_failed = |source| SupError::ReadFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = BufReader::new(File::open(path).map_err(read_failed)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(read_failed)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify that a file matches an expected checksum.
pub fn verify_checksum(path: &Path, expected: &str) -> SupResult<()> {
    let actual = calculate_file_checksum(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(SupError::ChecksumMismatch {
            file: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_calculate_file_checksum() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("app.hex");
        fs::write(&file_path, b"hello world").unwrap();

        assert_eq!(
            calculate_file_checksum(&file_path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_verify_checksum_mismatch() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("app.hex");
        fs::write(&file_path, b"hello world").unwrap();

        let err = verify_checksum(&file_path, "0000").unwrap_err();
        assert!(matches!(err, SupError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = calculate_file_checksum(Path::new("/nonexistent/app.hex")).unwrap_err();
        assert!(matches!(err, SupError::ReadFailed { .. }));
    }
}
