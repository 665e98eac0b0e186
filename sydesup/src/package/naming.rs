//! Centralized naming conventions for package content.
//!
//! This module is the single source of truth for names inside a package:
//! - Package file extension (`.syde_sup`)
//! - Definition and device-identification file names
//! - Per-node directories (e.g., `002_ECU_Main`)
//! - Per-file slots inside a node directory (e.g., `flash_01/app.hex`)
//!
//! Every file a node references gets its own slot directory, so two nodes, or
//! two entries of the same node, may reference files with identical base names
//! without colliding.

use std::path::{Component, Path, PathBuf};

/// Extension of zipped packages.
pub const PACKAGE_EXTENSION: &str = "syde_sup";

/// Package definition document at the package root.
pub const DEFINITION_FILE_NAME: &str = "sup_definition.xml";

/// Device-identification file at the package root.
pub const DEVICE_DEFINITIONS_FILE_NAME: &str = "device_definitions.ini";

/// Kind of file slot inside a node directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSlot {
    Flash,
    Nvm,
    Pem,
}

impl FileSlot {
    fn prefix(self) -> &'static str {
        match self {
            FileSlot::Flash => "flash",
            FileSlot::Nvm => "nvm",
            FileSlot::Pem => "pem",
        }
    }
}

/// Replace characters that are unsafe in directory names.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "node".to_string()
    } else {
        sanitized
    }
}

/// Directory holding one node's files.
///
/// # Format
///
/// `{node_index:03}_{sanitized_node_name}`
///
/// # Examples
///
/// ```
/// use sydesup::package::node_directory_name;
///
/// assert_eq!(node_directory_name(2, "ECU Main"), "002_ECU_Main");
/// ```
pub fn node_directory_name(node_index: usize, node_name: &str) -> String {
    format!("{:03}_{}", node_index, sanitize_name(node_name))
}

/// Package-relative path of one referenced file, always with `/` separators.
///
/// # Examples
///
/// ```
/// use sydesup::package::{packaged_file_path, FileSlot};
///
/// assert_eq!(
///     packaged_file_path(0, "ECU", FileSlot::Flash, 1, "app.hex"),
///     "000_ECU/flash_01/app.hex"
/// );
/// assert_eq!(
///     packaged_file_path(0, "ECU", FileSlot::Pem, 0, "ecu.pem"),
///     "000_ECU/pem/ecu.pem"
/// );
/// ```
pub fn packaged_file_path(
    node_index: usize,
    node_name: &str,
    slot: FileSlot,
    slot_index: usize,
    file_name: &str,
) -> String {
    let slot_dir = match slot {
        FileSlot::Pem => slot.prefix().to_string(),
        _ => format!("{}_{:02}", slot.prefix(), slot_index),
    };
    format!(
        "{}/{}/{}",
        node_directory_name(node_index, node_name),
        slot_dir,
        file_name
    )
}

/// Whether a file name carries the package extension.
pub fn has_package_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION))
}

/// Map a package-relative path onto `root`.
///
/// Returns `None` for absolute paths and paths containing `..`, which would
/// escape the package.
pub fn rebase_packaged_path(root: &Path, relative: &str) -> Option<PathBuf> {
    if relative.is_empty() {
        return None;
    }
    let mut rebased = root.to_path_buf();
    for part in relative.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => rebased.push(name),
            _ => return None,
        }
    }
    Some(rebased)
}
