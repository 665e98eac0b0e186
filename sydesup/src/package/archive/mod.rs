//! Physical packaging: staging, container formats and unpacking.
//!
//! Building a package happens in strictly sequential stages:
//!
//! 1. [`plan_package`] turns collected node content into the complete
//!    [`PackageDefinition`] plus the list of files to copy. Missing source
//!    files are reported here, before the filesystem is touched.
//! 2. [`build_package`] removes an existing package, copies every file into a
//!    private staging directory, writes the definition and device files, and
//!    hands the staged tree to an [`ArchiveFormat`].
//!
//! Two container formats exist behind the [`ArchiveFormat`] trait:
//! [`ZipFormat`] (the default) and [`LegacyDirectoryFormat`], a plain
//! directory tree consumed by older tooling.

mod directory;
mod zip_format;

pub use self::directory::LegacyDirectoryFormat;
pub use self::zip_format::ZipFormat;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{SupError, SupResult};
use crate::system::{Bus, Node, SystemDefinition};

use super::checksum::{calculate_file_checksum, verify_checksum};
use super::content::NodeUpdateContent;
use super::definition::{
    read_definition, read_device_definitions, referenced_device_definitions, write_definition,
    write_device_definitions, DocumentMeta, NodeDefinitionEntry, PackageDefinition, PackagedFile,
};
use super::naming::{packaged_file_path, rebase_packaged_path, FileSlot};
use super::order::order_from_positions;
use super::paths::normalize_path;

/// A container format for a staged package tree.
pub trait ArchiveFormat {
    /// Short name for log output.
    fn name(&self) -> &'static str;

    /// Publish the staged tree at `package_path`.
    ///
    /// `package_path` does not exist when this is called. `temp_dir`, if
    /// given, may be used as working space.
    fn write(&self, staging_dir: &Path, package_path: &Path, temp_dir: Option<&Path>)
        -> SupResult<()>;

    /// Make the package content available and return its root directory.
    fn open(&self, package_path: &Path, target_dir: &Path) -> SupResult<PathBuf>;
}

/// Select the container format.
pub fn archive_format(compatibility_format: bool) -> Box<dyn ArchiveFormat> {
    if compatibility_format {
        Box::new(LegacyDirectoryFormat::new())
    } else {
        Box::new(ZipFormat::new())
    }
}

/// A file copy from the authoring machine into the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub source: PathBuf,
    /// Package-relative destination.
    pub destination: String,
}

/// The complete package content, ready to be staged.
#[derive(Debug, Clone)]
pub struct PackagePlan {
    pub definition: PackageDefinition,
    pub files: Vec<StagedFile>,
}

/// Build the definition and copy list for the collected node content.
///
/// `contents` and `positions` are indexed by node. Inactive nodes keep an
/// empty entry so node identity stays positional.
pub fn plan_package(
    system: &SystemDefinition,
    contents: &[NodeUpdateContent],
    positions: &[Option<u32>],
    active_bus_index: usize,
) -> SupResult<PackagePlan> {
    let active_bus = system
        .buses
        .get(active_bus_index)
        .cloned()
        .ok_or_else(|| {
            SupError::InvalidSystemDefinition(format!(
                "active bus index {} out of range ({} buses)",
                active_bus_index,
                system.buses.len()
            ))
        })?;

    let mut files = Vec::new();
    let mut entries = Vec::with_capacity(system.nodes.len());

    for (node_index, ((node, content), position)) in system
        .nodes
        .iter()
        .zip(contents)
        .zip(positions)
        .enumerate()
    {
        let mut entry = NodeDefinitionEntry {
            name: node.name.clone(),
            device_type: node.device_type.clone(),
            device_definition_path: node.device_definition_path.clone(),
            other_accepted_device_names: node.other_accepted_device_names.clone(),
            active: content.active,
            update_position: if content.active { *position } else { None },
            ..Default::default()
        };

        if content.active {
            let mut stage = |source: &Path, slot: FileSlot, slot_index: usize| {
                stage_file(&node.name, node_index, source, slot, slot_index, &mut files)
            };

            for (slot_index, source) in content.files_to_flash.iter().enumerate() {
                entry
                    .application_files
                    .push(stage(source, FileSlot::Flash, slot_index)?);
            }
            for (slot_index, source) in content.files_to_write_to_nvm.iter().enumerate() {
                entry.nvm_files.push(stage(source, FileSlot::Nvm, slot_index)?);
            }
            if let Some(source) = &content.pem_file {
                entry.pem_file = Some(stage(source, FileSlot::Pem, 0)?);
                entry.pem_states = content.pem_states;
            }
        }

        entries.push(entry);
    }

    Ok(PackagePlan {
        definition: PackageDefinition {
            active_bus_index,
            active_bus,
            nodes: entries,
        },
        files,
    })
}

fn stage_file(
    node_name: &str,
    node_index: usize,
    source: &Path,
    slot: FileSlot,
    slot_index: usize,
    files: &mut Vec<StagedFile>,
) -> SupResult<PackagedFile> {
    if !source.is_file() {
        return Err(SupError::MissingFile {
            node: node_name.to_string(),
            path: source.to_path_buf(),
        });
    }
    let file_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| SupError::node(node_name, format!("{} has no file name", source.display())))?;

    let destination = packaged_file_path(node_index, node_name, slot, slot_index, &file_name);
    let sha256 = calculate_file_checksum(source)?;

    files.push(StagedFile {
        source: source.to_path_buf(),
        destination: destination.clone(),
    });
    Ok(PackagedFile::new(destination, sha256))
}

/// Remove a previous package (file or directory) at `path`.
pub fn remove_existing(path: &Path) -> SupResult<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return Ok(()),
    };
    result.map_err(|e| SupError::RemoveFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Fail if removing `path` would also delete one of `protected`.
///
/// Paths are compared after resolving symlinks, so `.` and an absolute
/// spelling of the same directory are treated alike. Nothing is checked
/// when `path` does not exist.
pub fn ensure_removal_spares<'a>(
    path: &Path,
    protected: impl IntoIterator<Item = &'a Path>,
) -> SupResult<()> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(());
    }
    let removed = resolved_path(path);
    for keep in protected {
        if resolved_path(keep).starts_with(&removed) {
            return Err(SupError::RemovalConflict {
                path: path.to_path_buf(),
                protected: keep.to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Absolute, symlink-free form of `path`. Missing trailing components are
/// appended to the canonical form of the deepest existing ancestor.
fn resolved_path(path: &Path) -> PathBuf {
    let absolute = match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => normalize_path(&cwd.join(path)),
        _ => normalize_path(path),
    };

    let mut missing = Vec::new();
    let mut existing = absolute.as_path();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |resolved, name| resolved.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_owned());
                existing = parent;
            }
            _ => return absolute.clone(),
        }
    }
}

/// Stage the planned content and publish it at `package_path`.
///
/// Any previous package at `package_path` is deleted first, so an aborted
/// build leaves no package or a partial one, never the old one. A previous
/// package that contains a source file or `temp_dir` is refused. The staging
/// tree lives in `temp_dir` if given, otherwise next to the package, and is
/// removed when the build ends.
pub fn build_package(
    plan: &PackagePlan,
    package_path: &Path,
    format: &dyn ArchiveFormat,
    temp_dir: Option<&Path>,
    meta: &DocumentMeta,
) -> SupResult<()> {
    let protected = plan.files.iter().map(|file| file.source.as_path());
    ensure_removal_spares(package_path, protected.chain(temp_dir))?;
    remove_existing(package_path)?;

    let staging_parent = match temp_dir {
        Some(dir) => dir.to_path_buf(),
        None => package_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    fs::create_dir_all(&staging_parent).map_err(|e| SupError::CreateDirFailed {
        path: staging_parent.clone(),
        source: e,
    })?;
    let staging = tempfile::Builder::new()
        .prefix(".sup-staging-")
        .tempdir_in(&staging_parent)
        .map_err(|e| SupError::CreateDirFailed {
            path: staging_parent.clone(),
            source: e,
        })?;

    for file in &plan.files {
        copy_into_staging(staging.path(), file)?;
    }

    write_definition(staging.path(), &plan.definition, meta)?;
    write_device_definitions(
        staging.path(),
        &referenced_device_definitions(&plan.definition),
    )?;

    tracing::info!(
        format = format.name(),
        files = plan.files.len(),
        package = %package_path.display(),
        "Writing package"
    );
    format.write(staging.path(), package_path, temp_dir)
}

fn copy_into_staging(staging: &Path, file: &StagedFile) -> SupResult<()> {
    let destination = rebase_packaged_path(staging, &file.destination).ok_or_else(|| {
        SupError::InvalidPackage(format!("invalid package path {}", file.destination))
    })?;
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| SupError::CreateDirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::copy(&file.source, &destination).map_err(|e| SupError::WriteFailed {
        path: destination.clone(),
        source: e,
    })?;
    tracing::debug!(
        source = %file.source.display(),
        destination = %file.destination,
        "Staged file"
    );
    Ok(())
}

/// Content read back from an unpacked package.
#[derive(Debug, Clone)]
pub struct PackageContent {
    /// Directory all paths below are rooted in.
    pub root: PathBuf,
    /// Node list sufficient for the flashing sequence.
    pub system: SystemDefinition,
    pub active_bus_index: usize,
    pub active_bus: Bus,
    pub active_nodes: Vec<bool>,
    pub update_order: Vec<usize>,
    /// Per-node files to write, rebased onto `root`.
    pub applications: Vec<NodeUpdateContent>,
    pub device_definitions: Vec<String>,
    pub meta: DocumentMeta,
}

/// Parse and validate an unpacked package tree.
///
/// The update order is rebuilt from the stored positions, which need not be
/// dense or unique. Every
/// referenced file must exist below `root` and match its recorded digest.
pub fn read_package(root: &Path) -> SupResult<PackageContent> {
    let (definition, meta) = read_definition(root)?;
    let device_definitions = read_device_definitions(root)?;

    let positions: Vec<Option<u32>> = definition
        .nodes
        .iter()
        .map(|node| if node.active { node.update_position } else { None })
        .collect();
    if let Some(node) = definition
        .nodes
        .iter()
        .find(|node| node.active && node.update_position.is_none())
    {
        return Err(SupError::InvalidPackage(format!(
            "active node \"{}\" has no update position",
            node.name
        )));
    }
    let update_order = order_from_positions(&positions);

    let mut nodes = Vec::with_capacity(definition.nodes.len());
    let mut applications = Vec::with_capacity(definition.nodes.len());
    for entry in &definition.nodes {
        applications.push(rebase_entry(root, entry)?);

        let mut node = Node::new(&entry.name, &entry.device_type)
            .with_device_definition(&entry.device_definition_path);
        node.other_accepted_device_names = entry.other_accepted_device_names.clone();
        nodes.push(node);
    }

    let active_nodes = definition.nodes.iter().map(|node| node.active).collect();

    Ok(PackageContent {
        root: root.to_path_buf(),
        system: SystemDefinition::new(nodes, vec![definition.active_bus.clone()]),
        active_bus_index: definition.active_bus_index,
        active_bus: definition.active_bus,
        active_nodes,
        update_order,
        applications,
        device_definitions,
        meta,
    })
}

fn rebase_entry(root: &Path, entry: &NodeDefinitionEntry) -> SupResult<NodeUpdateContent> {
    let rebase = |file: &PackagedFile| -> SupResult<PathBuf> {
        let path = rebase_packaged_path(root, &file.path).ok_or_else(|| {
            SupError::InvalidPackage(format!(
                "node \"{}\" references {} outside the package",
                entry.name, file.path
            ))
        })?;
        if !path.is_file() {
            return Err(SupError::MissingFile {
                node: entry.name.clone(),
                path,
            });
        }
        verify_checksum(&path, &file.sha256)?;
        Ok(path)
    };

    Ok(NodeUpdateContent {
        active: entry.active,
        files_to_flash: entry
            .application_files
            .iter()
            .map(&rebase)
            .collect::<SupResult<_>>()?,
        files_to_write_to_nvm: entry
            .nvm_files
            .iter()
            .map(&rebase)
            .collect::<SupResult<_>>()?,
        pem_file: entry.pem_file.as_ref().map(&rebase).transpose()?,
        pem_states: entry.pem_states,
        other_accepted_device_names: entry.other_accepted_device_names.iter().cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::BusKind;
    use tempfile::TempDir;

    fn system() -> SystemDefinition {
        SystemDefinition::new(
            vec![Node::new("A", "DEV"), Node::new("B", "DEV")],
            vec![Bus::new("CAN1", BusKind::Can)],
        )
    }

    #[test]
    fn test_plan_reports_missing_file_with_node() {
        let content = NodeUpdateContent {
            active: true,
            files_to_flash: vec![PathBuf::from("/nonexistent/app.hex")],
            ..Default::default()
        };
        let err = plan_package(
            &system(),
            &[content, NodeUpdateContent::inactive()],
            &[Some(0), None],
            0,
        )
        .unwrap_err();

        match err {
            SupError::MissingFile { node, path } => {
                assert_eq!(node, "A");
                assert_eq!(path, PathBuf::from("/nonexistent/app.hex"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_plan_separates_identical_file_names() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("one");
        let second = temp.path().join("two");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("app.hex"), b"one").unwrap();
        fs::write(second.join("app.hex"), b"two").unwrap();

        let content = |path: PathBuf| NodeUpdateContent {
            active: true,
            files_to_flash: vec![path],
            ..Default::default()
        };
        let plan = plan_package(
            &system(),
            &[content(first.join("app.hex")), content(second.join("app.hex"))],
            &[Some(1), Some(0)],
            0,
        )
        .unwrap();

        let destinations: Vec<&str> = plan.files.iter().map(|f| f.destination.as_str()).collect();
        assert_eq!(destinations, vec!["000_A/flash_00/app.hex", "001_B/flash_00/app.hex"]);
        assert_eq!(plan.definition.nodes[0].update_position, Some(1));
    }

    #[test]
    fn test_plan_rejects_unknown_bus() {
        let err = plan_package(&system(), &[], &[], 3).unwrap_err();
        assert!(matches!(err, SupError::InvalidSystemDefinition(_)));
    }

    #[test]
    fn test_build_refuses_to_replace_directory_holding_sources() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("app.hex"), b"app").unwrap();

        let content = NodeUpdateContent {
            active: true,
            files_to_flash: vec![output.join("app.hex")],
            ..Default::default()
        };
        let plan = plan_package(
            &system(),
            &[content, NodeUpdateContent::inactive()],
            &[Some(0), None],
            0,
        )
        .unwrap();

        let err = build_package(
            &plan,
            &output,
            &LegacyDirectoryFormat::new(),
            None,
            &DocumentMeta::at("x"),
        )
        .unwrap_err();

        assert!(matches!(err, SupError::RemovalConflict { .. }));
        assert!(output.join("app.hex").is_file());
    }

    #[test]
    fn test_removal_guard_resolves_relative_spellings() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("work").join("update.syde_sup");
        fs::create_dir_all(package.parent().unwrap()).unwrap();
        fs::write(&package, b"PK").unwrap();

        let dotted = temp.path().join("work").join(".").join("..").join("work");
        assert!(ensure_removal_spares(&dotted, [package.as_path()]).is_err());
        assert!(ensure_removal_spares(&package, [package.as_path()]).is_err());
        assert!(ensure_removal_spares(&temp.path().join("other"), [package.as_path()]).is_ok());

        let sibling = temp.path().join("target");
        fs::create_dir_all(&sibling).unwrap();
        assert!(ensure_removal_spares(&sibling, [package.as_path()]).is_ok());
    }

    #[test]
    fn test_read_accepts_shared_and_sparse_positions() {
        let temp = TempDir::new().unwrap();
        let entry = |name: &str, position: u32| NodeDefinitionEntry {
            name: name.to_string(),
            device_type: "DEV".to_string(),
            device_definition_path: "DEV.syde_devdef".to_string(),
            active: true,
            update_position: Some(position),
            ..Default::default()
        };
        let definition = PackageDefinition {
            active_bus_index: 0,
            active_bus: Bus::new("CAN1", BusKind::Can),
            nodes: vec![entry("A", 2), entry("B", 0), entry("C", 0)],
        };
        write_definition(temp.path(), &definition, &DocumentMeta::at("x")).unwrap();
        write_device_definitions(temp.path(), &referenced_device_definitions(&definition))
            .unwrap();

        let content = read_package(temp.path()).unwrap();
        assert_eq!(content.update_order, vec![1, 2, 0]);
        assert_eq!(content.active_nodes, vec![true, true, true]);
    }

    #[test]
    fn test_remove_existing_handles_files_and_directories() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("pkg.syde_sup");
        let dir = temp.path().join("pkg_dir");
        fs::write(&file, b"old").unwrap();
        fs::create_dir_all(dir.join("nested")).unwrap();

        remove_existing(&file).unwrap();
        remove_existing(&dir).unwrap();
        remove_existing(&temp.path().join("absent")).unwrap();

        assert!(!file.exists());
        assert!(!dir.exists());
    }
}
