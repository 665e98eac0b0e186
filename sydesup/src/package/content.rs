//! Collection of the files each node has to receive.
//!
//! For every active node the collector resolves what ends up in the package:
//! flashable Data Block outputs followed by file-based applications, NVM
//! parameter-set images and an optional PEM security file with the requested
//! security and debugger states.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{SupError, SupResult};
use crate::system::{DataBlock, DebuggerState, Node, NodeUpdateInfo, SecurityState};

use super::paths::{
    make_absolute, resolve_data_block_output_path, resolve_file_based_path,
    resolve_nvm_image_path, resolve_pem_path, Placeholders, VAR_DATA_BLOCK_PROJECT,
};

/// A requested state change: whether to send it and which value to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateFlag {
    pub send: bool,
    pub enabled: bool,
}

impl StateFlag {
    pub fn new(send: bool, enabled: bool) -> Self {
        Self { send, enabled }
    }
}

impl From<SecurityState> for StateFlag {
    fn from(state: SecurityState) -> Self {
        match state {
            SecurityState::NoChange => Self::new(false, false),
            SecurityState::Activate => Self::new(true, true),
            SecurityState::Deactivate => Self::new(true, false),
        }
    }
}

impl From<DebuggerState> for StateFlag {
    fn from(state: DebuggerState) -> Self {
        match state {
            DebuggerState::NoChange => Self::new(false, false),
            DebuggerState::Activate => Self::new(true, true),
            DebuggerState::Deactivate => Self::new(true, false),
        }
    }
}

/// Security and debugger states applied together with the PEM file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PemStates {
    pub security: StateFlag,
    pub debugger: StateFlag,
}

/// Everything one node receives during an update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeUpdateContent {
    pub active: bool,

    /// Data Block outputs first, then file-based applications.
    pub files_to_flash: Vec<PathBuf>,

    /// Parameter-set images.
    pub files_to_write_to_nvm: Vec<PathBuf>,

    pub pem_file: Option<PathBuf>,

    /// Only meaningful when `pem_file` is set.
    pub pem_states: PemStates,

    pub other_accepted_device_names: BTreeSet<String>,
}

impl NodeUpdateContent {
    /// Placeholder for a node that takes no part in the update.
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Whether there is anything to transfer to the node.
    pub fn has_content(&self) -> bool {
        !self.files_to_flash.is_empty()
            || !self.files_to_write_to_nvm.is_empty()
            || self.pem_file.is_some()
    }

    /// All referenced files, in flash, NVM, PEM order.
    pub fn all_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.files_to_flash
            .iter()
            .chain(self.files_to_write_to_nvm.iter())
            .chain(self.pem_file.iter())
    }
}

/// Data Blocks of a node, split once by purpose.
struct SplitDataBlocks<'a> {
    flash: Vec<&'a DataBlock>,
    parameter_sets: Vec<&'a DataBlock>,
}

impl<'a> SplitDataBlocks<'a> {
    fn new(node: &'a Node) -> Self {
        let (parameter_sets, flash): (Vec<&DataBlock>, Vec<&DataBlock>) = node
            .data_blocks
            .iter()
            .partition(|data_block| data_block.is_parameter_set());
        Self {
            flash,
            parameter_sets,
        }
    }

    /// Flashable outputs with their Data Block project, in declaration order.
    fn flash_outputs(&self) -> Vec<(&'a str, &'a str)> {
        self.flash
            .iter()
            .flat_map(|&data_block| {
                data_block
                    .result_paths
                    .iter()
                    .map(move |path| (path.as_str(), data_block.project_path.as_str()))
            })
            .collect()
    }
}

/// Collect the update content of one node.
///
/// The returned content is marked active if there is anything to transfer;
/// the caller combines that with the node's nominal active flag.
pub fn collect_node_content(
    node: &Node,
    info: &NodeUpdateInfo,
    project_dir: &Path,
    placeholders: &Placeholders,
) -> SupResult<NodeUpdateContent> {
    let mut content = NodeUpdateContent {
        other_accepted_device_names: node.other_accepted_device_names.iter().cloned().collect(),
        ..Default::default()
    };

    let data_blocks = SplitDataBlocks::new(node);

    collect_data_block_files(node, &data_blocks, info, project_dir, placeholders, &mut content)?;
    collect_file_based_files(node, info, project_dir, &mut content)?;
    collect_parameter_sets(node, &data_blocks, info, project_dir, placeholders, &mut content)?;
    collect_pem_file(node, info, project_dir, &mut content)?;

    content.active = content.has_content();

    tracing::debug!(
        node = %node.name,
        flash = content.files_to_flash.len(),
        nvm = content.files_to_write_to_nvm.len(),
        pem = content.pem_file.is_some(),
        "Collected node content"
    );

    Ok(content)
}

fn collect_data_block_files(
    node: &Node,
    data_blocks: &SplitDataBlocks<'_>,
    info: &NodeUpdateInfo,
    project_dir: &Path,
    placeholders: &Placeholders,
    content: &mut NodeUpdateContent,
) -> SupResult<()> {
    let outputs = data_blocks.flash_outputs();
    if outputs.len() != info.data_block_files.len() {
        return Err(SupError::node(
            &node.name,
            format!(
                "update settings list {} Data Block files but the node declares {} outputs",
                info.data_block_files.len(),
                outputs.len()
            ),
        ));
    }

    // Entries and outputs share one flat index across all Data Blocks.
    for ((result_path, data_block_project), entry) in outputs.iter().zip(&info.data_block_files) {
        if entry.skip {
            continue;
        }
        let block_placeholders = with_data_block_project(placeholders, data_block_project, project_dir);
        content.files_to_flash.push(resolve_data_block_output_path(
            &entry.path,
            result_path,
            data_block_project,
            project_dir,
            &block_placeholders,
        ));
    }
    Ok(())
}

/// `placeholders` plus `DATABLOCK_PROJECT`, if the Data Block has a project.
fn with_data_block_project(
    placeholders: &Placeholders,
    data_block_project: &str,
    project_dir: &Path,
) -> Placeholders {
    let mut block_placeholders = placeholders.clone();
    if !data_block_project.is_empty() {
        block_placeholders.set(
            VAR_DATA_BLOCK_PROJECT,
            make_absolute(data_block_project, project_dir).to_string_lossy(),
        );
    }
    block_placeholders
}

fn collect_file_based_files(
    node: &Node,
    info: &NodeUpdateInfo,
    project_dir: &Path,
    content: &mut NodeUpdateContent,
) -> SupResult<()> {
    for (index, entry) in info.file_based_files.iter().enumerate() {
        if entry.skip {
            continue;
        }
        if !entry.has_override() {
            return Err(SupError::node(
                &node.name,
                format!("file-based application {} has no path", index),
            ));
        }
        content
            .files_to_flash
            .push(resolve_file_based_path(&entry.path, project_dir));
    }
    Ok(())
}

fn collect_parameter_sets(
    node: &Node,
    data_blocks: &SplitDataBlocks<'_>,
    info: &NodeUpdateInfo,
    project_dir: &Path,
    placeholders: &Placeholders,
    content: &mut NodeUpdateContent,
) -> SupResult<()> {
    if info.parameter_sets.is_empty() {
        return Ok(());
    }
    if data_blocks.parameter_sets.len() > 1 {
        return Err(SupError::node(
            &node.name,
            format!(
                "expected one Data Block of type HALC parameter set, found {}",
                data_blocks.parameter_sets.len()
            ),
        ));
    }
    let parameter_block = data_blocks.parameter_sets.first().copied();
    let block_placeholders = match parameter_block {
        Some(data_block) => {
            with_data_block_project(placeholders, &data_block.project_path, project_dir)
        }
        None => placeholders.clone(),
    };

    // The file counter advances for skipped entries too.
    for (file_index, entry) in info.parameter_sets.iter().enumerate() {
        if entry.skip {
            continue;
        }

        let path = if entry.has_override() {
            resolve_nvm_image_path(&entry.path, "", "", project_dir, &block_placeholders)
        } else {
            let data_block = parameter_block.ok_or_else(|| {
                SupError::node(
                    &node.name,
                    "parameter set has no matching Data Block of type HALC parameter set",
                )
            })?;
            let output = data_block.result_paths.get(file_index).ok_or_else(|| {
                SupError::node(
                    &node.name,
                    format!(
                        "parameter set {} has no matching output in Data Block \"{}\"",
                        file_index, data_block.name
                    ),
                )
            })?;
            resolve_nvm_image_path(
                "",
                output,
                &data_block.project_path,
                project_dir,
                &block_placeholders,
            )
        };
        content.files_to_write_to_nvm.push(path);
    }
    Ok(())
}

fn collect_pem_file(
    node: &Node,
    info: &NodeUpdateInfo,
    project_dir: &Path,
    content: &mut NodeUpdateContent,
) -> SupResult<()> {
    let Some(pem) = info.pem.as_ref() else {
        return Ok(());
    };
    // Skipping drops the whole PEM section, states included.
    if pem.skip {
        return Ok(());
    }
    if pem.path.is_empty() {
        if pem.requests_state_change() {
            return Err(SupError::node(
                &node.name,
                "security or debugger state requested without a PEM file",
            ));
        }
        return Ok(());
    }

    content.pem_file = Some(resolve_pem_path(&pem.path, project_dir));
    content.pem_states = PemStates {
        security: pem.security.into(),
        debugger: pem.debugger.into(),
    };
    Ok(())
}
