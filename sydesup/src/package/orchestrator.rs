//! Top-level package entry points.
//!
//! [`create_package`] and [`process_package`] are the only places where the
//! internal [`SupError`] space is translated into the caller-facing
//! [`PackageStatus`]. Both run synchronously and block on the filesystem;
//! callers that need responsiveness run them on a worker thread.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::{ErrorKind, SupError, SupResult};
use crate::project::ProjectFile;
use crate::system::{NodeUpdateInfo, SystemDefinition};

use super::archive::{
    archive_format, build_package, ensure_removal_spares, plan_package, read_package,
    remove_existing, ArchiveFormat, LegacyDirectoryFormat, PackageContent, ZipFormat,
};
use super::content::{collect_node_content, NodeUpdateContent};
use super::definition::DocumentMeta;
use super::naming::has_package_extension;
use super::order::{normalized_positions, plan_update_order};
use super::paths::{normalize_path, Placeholders};

/// Caller-facing failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    /// Project or view could not be loaded.
    LoadFailed,
    /// Filesystem or archive failure.
    ReadWriteFailed,
    /// Structural problem in the input or the package content.
    ConfigurationFailed,
}

impl From<ErrorKind> for PackageStatus {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Input => PackageStatus::LoadFailed,
            ErrorKind::Io => PackageStatus::ReadWriteFailed,
            ErrorKind::Configuration | ErrorKind::VersionMismatch => {
                PackageStatus::ConfigurationFailed
            }
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageStatus::LoadFailed => write!(f, "load failed"),
            PackageStatus::ReadWriteFailed => write!(f, "read/write failed"),
            PackageStatus::ConfigurationFailed => write!(f, "configuration failed"),
        }
    }
}

/// A failed create or unpack call.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct PackageFailure {
    pub status: PackageStatus,
    pub message: String,
    /// Warnings collected before the failure.
    pub warnings: Vec<String>,
    #[source]
    pub source: SupError,
}

/// Warnings collected during one create or unpack call.
#[derive(Debug, Default)]
pub struct BuildContext {
    pub warnings: Vec<String>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a non-fatal problem.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    fn fail(self, error: SupError) -> PackageFailure {
        let message = error.to_string();
        tracing::error!(kind = ?error.kind(), "{}", message);
        PackageFailure {
            status: error.kind().into(),
            message,
            warnings: self.warnings,
            source: error,
        }
    }
}

/// Options for [`create_package`].
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
    /// Write the legacy directory layout instead of a zip file.
    pub compatibility_format: bool,

    /// Working space for staging and zipping. Defaults to the package's
    /// parent directory.
    pub temp_dir: Option<PathBuf>,

    /// Overrides the view's active bus.
    pub active_bus_index: Option<usize>,
}

impl PackageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compatibility_format(mut self, enabled: bool) -> Self {
        self.compatibility_format = enabled;
        self
    }

    pub fn with_temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    pub fn with_active_bus(mut self, index: usize) -> Self {
        self.active_bus_index = Some(index);
        self
    }
}

/// Everything [`create_package`] needs about the system and the view.
#[derive(Debug, Clone, Copy)]
pub struct PackageInput<'a> {
    pub system: &'a SystemDefinition,
    pub active_bus_index: usize,
    /// Nominal active flag per node.
    pub active_nodes: &'a [bool],
    /// Update info per node.
    pub update_infos: &'a [NodeUpdateInfo],
    /// Directory relative paths and `OPENSYDE_PROJECT` resolve against.
    pub project_dir: &'a Path,
    pub project_name: &'a str,
}

/// Result of a successful [`create_package`] call.
#[derive(Debug, Clone)]
pub struct CreateReport {
    pub package_path: PathBuf,
    /// Active flags after auto-deactivation.
    pub active_nodes: Vec<bool>,
    pub update_order: Vec<usize>,
    pub warnings: Vec<String>,
}

/// Content of a successfully unpacked package.
#[derive(Debug, Clone)]
pub struct UnpackReport {
    pub content: PackageContent,
    pub warnings: Vec<String>,
}

/// Result of [`process_package`].
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Unpacked(UnpackReport),
    /// The package uses an older definition format; retry with a legacy
    /// reader.
    UseDifferentLoader { file_version: u32 },
}

/// Create a package at `package_path`.
///
/// Validation happens before the filesystem is touched. Nodes that are
/// flagged active but have nothing to transfer, or no update position, are
/// deactivated with a warning.
pub fn create_package(
    package_path: &Path,
    input: &PackageInput<'_>,
    options: &PackageOptions,
) -> Result<CreateReport, PackageFailure> {
    let mut ctx = BuildContext::new();
    tracing::info!(package = %package_path.display(), "Creating package");

    match try_create_package(package_path, input, options, &mut ctx) {
        Ok((active_nodes, update_order)) => {
            tracing::info!(
                package = %package_path.display(),
                nodes = update_order.len(),
                warnings = ctx.warnings.len(),
                "Package created"
            );
            Ok(CreateReport {
                package_path: package_path.to_path_buf(),
                active_nodes,
                update_order,
                warnings: ctx.warnings,
            })
        }
        Err(e) => Err(ctx.fail(e)),
    }
}

/// Load a project file and create a package from one of its views.
pub fn create_package_from_project(
    project_path: &Path,
    view_name: &str,
    package_path: &Path,
    options: &PackageOptions,
) -> Result<CreateReport, PackageFailure> {
    let loaded = ProjectFile::load(project_path).and_then(|project| {
        let view = project.view(view_name)?.clone();
        Ok((project, view))
    });
    let (project, view) = loaded.map_err(|e| BuildContext::new().fail(e))?;

    let active_nodes = view.active_flags();
    let update_infos = view.update_infos();
    let input = PackageInput {
        system: &project.system,
        active_bus_index: options.active_bus_index.unwrap_or(view.active_bus_index),
        active_nodes: &active_nodes,
        update_infos: &update_infos,
        project_dir: &project.directory,
        project_name: &project.name,
    };
    create_package(package_path, &input, options)
}

fn try_create_package(
    package_path: &Path,
    input: &PackageInput<'_>,
    options: &PackageOptions,
    ctx: &mut BuildContext,
) -> SupResult<(Vec<bool>, Vec<usize>)> {
    validate_input(input)?;
    check_target_writable(package_path)?;

    let project_dir = absolute_dir(input.project_dir)?;
    let placeholders = Placeholders::for_project(&project_dir, input.project_name);
    let system = input.system;

    let mut contents = Vec::with_capacity(system.node_count());
    for ((node, &requested), info) in system
        .nodes
        .iter()
        .zip(input.active_nodes)
        .zip(input.update_infos)
    {
        if !requested {
            contents.push(NodeUpdateContent::inactive());
            continue;
        }
        if info.position.is_none() {
            ctx.warn(format!(
                "node \"{}\" is requested for update but has no update position assigned, skipped",
                node.name
            ));
            contents.push(NodeUpdateContent::inactive());
            continue;
        }

        let content = collect_node_content(node, info, &project_dir, &placeholders)?;
        if !content.active {
            ctx.warn(format!(
                "node \"{}\" is requested for update but has no files to transfer, skipped",
                node.name
            ));
        }
        contents.push(content);
    }

    let active_nodes: Vec<bool> = contents.iter().map(|content| content.active).collect();
    if !active_nodes.iter().any(|&active| active) {
        return Err(SupError::InvalidSystemDefinition(
            "no node has anything to update".to_string(),
        ));
    }

    let raw_positions: Vec<u32> = input
        .update_infos
        .iter()
        .map(|info| info.position.unwrap_or(0))
        .collect();
    let update_order = plan_update_order(&active_nodes, &raw_positions);
    let positions = normalized_positions(&update_order, system.node_count());
    tracing::debug!(order = ?update_order, "Planned update order");

    let plan = plan_package(system, &contents, &positions, input.active_bus_index)?;
    let format = archive_format(options.compatibility_format);
    build_package(
        &plan,
        package_path,
        format.as_ref(),
        options.temp_dir.as_deref(),
        &DocumentMeta::now(),
    )?;

    Ok((active_nodes, update_order))
}

fn validate_input(input: &PackageInput<'_>) -> SupResult<()> {
    let system = input.system;
    if system.is_empty() {
        return Err(SupError::InvalidSystemDefinition(
            "system definition has no nodes".to_string(),
        ));
    }
    let node_count = system.node_count();
    if input.active_nodes.len() != node_count || input.update_infos.len() != node_count {
        return Err(SupError::InvalidSystemDefinition(format!(
            "{} nodes, but {} active flags and {} update entries",
            node_count,
            input.active_nodes.len(),
            input.update_infos.len()
        )));
    }
    if input.active_bus_index >= system.buses.len() {
        return Err(SupError::InvalidSystemDefinition(format!(
            "active bus index {} out of range ({} buses)",
            input.active_bus_index,
            system.buses.len()
        )));
    }

    for (node, _) in system
        .nodes
        .iter()
        .zip(input.active_nodes)
        .filter(|(_, active)| **active)
    {
        if !node.is_connected_to(input.active_bus_index) {
            return Err(SupError::node(
                &node.name,
                format!(
                    "not connected to active bus \"{}\"",
                    system.buses[input.active_bus_index].name
                ),
            ));
        }
    }
    Ok(())
}

fn check_target_writable(package_path: &Path) -> SupResult<()> {
    let parent = match package_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !parent.is_dir() {
        return Err(SupError::TargetNotWritable(parent));
    }
    tempfile::tempfile_in(&parent).map_err(|_| SupError::TargetNotWritable(parent.clone()))?;
    Ok(())
}

fn absolute_dir(dir: &Path) -> SupResult<PathBuf> {
    if dir.is_absolute() {
        return Ok(normalize_path(dir));
    }
    let cwd = std::env::current_dir().map_err(|e| SupError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;
    Ok(normalize_path(&cwd.join(dir)))
}

/// Unpack and validate a package.
///
/// With `is_zip` the archive is extracted into `target_dir`, which is
/// removed and recreated first. A target that is or contains the package
/// itself is refused. Otherwise `package_path` is read in place as
/// an already extracted directory and `target_dir` is unused.
pub fn process_package(
    package_path: &Path,
    target_dir: &Path,
    is_zip: bool,
) -> Result<ProcessOutcome, PackageFailure> {
    let mut ctx = BuildContext::new();
    tracing::info!(package = %package_path.display(), "Processing package");

    match try_process_package(package_path, target_dir, is_zip, &mut ctx) {
        Ok(content) => {
            tracing::info!(
                nodes = content.update_order.len(),
                root = %content.root.display(),
                "Package unpacked"
            );
            Ok(ProcessOutcome::Unpacked(UnpackReport {
                content,
                warnings: ctx.warnings,
            }))
        }
        Err(SupError::OlderFileVersion { found, current }) => {
            tracing::info!(
                found,
                current,
                "Package uses an older definition format, different loader required"
            );
            Ok(ProcessOutcome::UseDifferentLoader {
                file_version: found,
            })
        }
        Err(e) => Err(ctx.fail(e)),
    }
}

fn try_process_package(
    package_path: &Path,
    target_dir: &Path,
    is_zip: bool,
    ctx: &mut BuildContext,
) -> SupResult<PackageContent> {
    let root = if is_zip {
        if !package_path.is_file() {
            return Err(SupError::InvalidPackage(format!(
                "{} is not a package file",
                package_path.display()
            )));
        }
        if !has_package_extension(package_path) {
            return Err(SupError::InvalidPackage(format!(
                "{} does not have the .{} extension",
                package_path.display(),
                super::naming::PACKAGE_EXTENSION
            )));
        }

        ensure_removal_spares(target_dir, [package_path])?;
        remove_existing(target_dir)?;
        std::fs::create_dir_all(target_dir).map_err(|e| SupError::CreateDirFailed {
            path: target_dir.to_path_buf(),
            source: e,
        })?;
        ZipFormat::new().open(package_path, target_dir)?
    } else {
        LegacyDirectoryFormat::new().open(package_path, target_dir)?
    };

    let content = read_package(&root)?;
    check_generator_version(&content.meta, ctx);
    Ok(content)
}

fn check_generator_version(meta: &DocumentMeta, ctx: &mut BuildContext) {
    let Ok(own) = semver::Version::parse(env!("CARGO_PKG_VERSION")) else {
        return;
    };
    match meta.generator_version() {
        Some(generator) if generator > own => ctx.warn(format!(
            "package was created by a newer version ({}) than this reader ({})",
            generator, own
        )),
        None => tracing::debug!(generator = %meta.generator, "Unknown package generator"),
        _ => {}
    }
}
